use std::path::PathBuf;

/// A deploy target loaded from an `env:<name>` config section.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Environment {
    pub name: String,
    pub playbook_params: Vec<String>,
    pub working_dir: PathBuf,
}

impl Environment {
    pub fn new(
        name: impl Into<String>,
        playbook_params: &str,
        working_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            playbook_params: split_playbook_params(playbook_params),
            working_dir: working_dir.into(),
        }
    }
}

pub fn split_playbook_params(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(str::to_owned).collect()
}

/// Environments in config file order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Environments(Vec<Environment>);

impl Environments {
    pub fn new(environments: Vec<Environment>) -> Self {
        Self(environments)
    }

    pub fn get(&self, name: &str) -> Option<&Environment> {
        self.0.iter().find(|environment| environment.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> Vec<&str> {
        self.0.iter().map(|environment| environment.name.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Environment> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::{split_playbook_params, Environment, Environments};

    #[test]
    fn playbook_params_split_on_any_whitespace() {
        assert_eq!(
            split_playbook_params("  site.yml -i  inventories/prod\t--diff "),
            vec!["site.yml", "-i", "inventories/prod", "--diff"]
        );
        assert!(split_playbook_params("   ").is_empty());
    }

    #[test]
    fn names_keep_insertion_order() {
        let environments = Environments::new(vec![
            Environment::new("staging", "site.yml", "/srv/staging"),
            Environment::new("prod", "site.yml", "/srv/prod"),
        ]);

        assert_eq!(environments.names(), vec!["staging", "prod"]);
        assert!(environments.contains("prod"));
        assert!(!environments.contains("Prod"));
        assert_eq!(environments.len(), 2);
    }
}
