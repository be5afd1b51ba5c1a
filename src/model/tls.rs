use super::Hostname;

impl Hostname {
    /// DNS names a certificate for this hostname must cover, primary first.
    ///
    /// Names exactly one label below a wildcard domain collapse into that
    /// domain's wildcard subject.
    pub fn certificate_subjects(&self, wildcard_domains: &[String]) -> Vec<String> {
        let mut subjects: Vec<String> = Vec::new();
        for name in std::iter::once(&self.name).chain(self.alternatives.iter()) {
            let subject = wildcard_subject(name, wildcard_domains).unwrap_or_else(|| name.clone());
            if !subjects.contains(&subject) {
                subjects.push(subject);
            }
        }
        subjects
    }
}

fn wildcard_subject(name: &str, wildcard_domains: &[String]) -> Option<String> {
    wildcard_domains.iter().find_map(|domain| {
        let label = name.strip_suffix(domain.as_str())?.strip_suffix('.')?;
        (!label.is_empty() && !label.contains('.')).then(|| format!("*.{}", domain))
    })
}
