use super::{Container, LABEL_AUTH, split_list};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Running containers keyed by id.
pub type Containers = HashMap<String, Container>;

/// A DNS name used for proxying and certificates, with every container serving it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Hostname {
    pub name: String,
    pub alternatives: BTreeSet<String>,
    pub containers: Vec<Container>,
    pub requires_auth: bool,
    pub auth_group: String,
}

impl Hostname {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alternatives: BTreeSet::new(),
            containers: Vec::new(),
            requires_auth: false,
            auth_group: String::new(),
        }
    }

    fn update(&mut self, alternates: &[String], container: &Container) {
        self.containers.push(container.clone());
        self.alternatives.extend(alternates.iter().cloned());

        if let Some(group) = container.labels.get(LABEL_AUTH) {
            self.requires_auth = true;
            self.auth_group = group.clone();
        }
    }
}

/// Folds containers into hostnames keyed by primary name.
///
/// Every call rebuilds the model from scratch. Containers are visited in id
/// order, so when several containers declare different auth groups for one
/// hostname the container with the greatest id wins.
pub fn aggregate(containers: &Containers) -> BTreeMap<String, Hostname> {
    let mut ordered: Vec<&Container> = containers.values().collect();
    ordered.sort_by(|a, b| a.id.cmp(&b.id));

    let mut hostnames: BTreeMap<String, Hostname> = BTreeMap::new();
    for container in ordered {
        let Some(label) = container.vhost() else {
            continue;
        };
        let names = split_list(label);
        let Some((primary, alternates)) = names.split_first() else {
            continue;
        };

        hostnames
            .entry(primary.clone())
            .or_insert_with(|| Hostname::new(primary.clone()))
            .update(alternates, container);
    }
    hostnames
}

/// Everything a downstream renderer needs to produce proxy configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
pub struct TemplateContext {
    pub containers: Vec<Container>,
    pub hostnames: BTreeMap<String, Hostname>,
    /// Certificate subjects per primary hostname.
    pub certificates: BTreeMap<String, Vec<String>>,
}

impl TemplateContext {
    pub fn new(containers: &Containers, wildcard_domains: &[String]) -> Self {
        let hostnames = aggregate(containers);
        let certificates = hostnames
            .values()
            .map(|h| (h.name.clone(), h.certificate_subjects(wildcard_domains)))
            .collect();

        let mut containers: Vec<Container> = containers.values().cloned().collect();
        containers.sort_by(|a, b| a.id.cmp(&b.id));

        Self {
            containers,
            hostnames,
            certificates,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::container::tests::container;
    use crate::model::{LABEL_PROXY, LABEL_VHOST};

    fn registry(containers: Vec<Container>) -> Containers {
        containers.into_iter().map(|c| (c.id.clone(), c)).collect()
    }

    #[test]
    fn merges_containers_sharing_a_primary_name() {
        let containers = registry(vec![
            container("one", &[(LABEL_VHOST, "a.com,b.com")]),
            container("two", &[(LABEL_VHOST, "a.com,c.com")]),
        ]);

        let hostnames = aggregate(&containers);
        assert_eq!(hostnames.len(), 1);

        let host = &hostnames["a.com"];
        assert_eq!(host.name, "a.com");
        assert_eq!(
            host.alternatives,
            BTreeSet::from(["b.com".to_string(), "c.com".to_string()])
        );
        let ids: Vec<_> = host.containers.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["one", "two"]);
        assert!(!host.requires_auth);
    }

    #[test]
    fn deduplicates_alternatives() {
        let containers = registry(vec![
            container("one", &[(LABEL_VHOST, "a.com b.com")]),
            container("two", &[(LABEL_VHOST, "a.com, b.com")]),
        ]);
        let hostnames = aggregate(&containers);
        assert_eq!(hostnames["a.com"].alternatives.len(), 1);
    }

    #[test]
    fn containers_without_vhost_do_not_route() {
        let containers = registry(vec![
            container("one", &[(LABEL_VHOST, "a.com")]),
            container("two", &[(LABEL_PROXY, "80")]),
            container("three", &[(LABEL_VHOST, " , ")]),
        ]);
        let hostnames = aggregate(&containers);
        assert_eq!(hostnames.len(), 1);
        assert!(
            hostnames
                .values()
                .flat_map(|h| &h.containers)
                .all(|c| c.id == "one")
        );
    }

    #[test]
    fn aggregation_is_idempotent() {
        let containers = registry(vec![
            container("one", &[(LABEL_VHOST, "a.com,b.com"), (LABEL_AUTH, "x")]),
            container("two", &[(LABEL_VHOST, "a.com,c.com")]),
            container("three", &[(LABEL_VHOST, "d.com")]),
        ]);
        assert_eq!(aggregate(&containers), aggregate(&containers));
    }

    #[test]
    fn auth_label_marks_hostname() {
        let containers = registry(vec![
            container("one", &[(LABEL_VHOST, "a.com"), (LABEL_AUTH, "admins")]),
            container("two", &[(LABEL_VHOST, "a.com")]),
        ]);
        let host = &aggregate(&containers)["a.com"];
        assert!(host.requires_auth);
        assert_eq!(host.auth_group, "admins");
    }

    #[test]
    fn conflicting_auth_groups_resolve_by_container_id() {
        let containers = registry(vec![
            container("b", &[(LABEL_VHOST, "a.com"), (LABEL_AUTH, "users")]),
            container("a", &[(LABEL_VHOST, "a.com"), (LABEL_AUTH, "admins")]),
        ]);
        let host = &aggregate(&containers)["a.com"];
        assert!(host.requires_auth);
        assert!(["admins", "users"].contains(&host.auth_group.as_str()));
        assert_eq!(host.auth_group, "users");
    }

    #[test]
    fn template_context_lists_containers_in_id_order() {
        let containers = registry(vec![
            container("b", &[(LABEL_VHOST, "x.example.com")]),
            container("a", &[]),
        ]);
        let context = TemplateContext::new(&containers, &["example.com".to_string()]);
        let ids: Vec<_> = context.containers.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(
            context.certificates["x.example.com"],
            vec!["*.example.com".to_string()]
        );
    }
}
