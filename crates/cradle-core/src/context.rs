//! Runtime context.

use crate::config::Config;
use crate::repository::{Category, Repository, RepositoryError};

/// Process-wide runtime state: the configuration plus the component
/// repository.
///
/// Constructed once in `main` and passed by reference; nothing here lives in
/// implicit global storage.
pub struct Context {
    config: Config,
    repository: Repository,
}

impl Context {
    /// Build a context and load every plugin under `config.plugin_path`.
    ///
    /// Plugins that fail to load are logged and skipped.
    pub fn new(config: Config) -> Self {
        let mut repository = Repository::new();
        repository.load(&config.plugin_path);

        Self { config, repository }
    }

    /// The runtime configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The component repository.
    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    /// Mutable access to the repository, for registering built-in
    /// components before any `get`.
    pub fn repository_mut(&mut self) -> &mut Repository {
        &mut self.repository
    }

    /// Construct a component of category `C` by type name.
    pub fn get<C: Category>(
        &self,
        type_name: &str,
        args: &C::Args,
    ) -> Result<C::Instance, RepositoryError> {
        self.repository.get::<C>(type_name, args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{Category, Factory};
    use std::path::PathBuf;

    struct Greeter;

    impl Category for Greeter {
        const NAME: &'static str = "greeter";
        type Instance = String;
        type Args = String;
    }

    #[test]
    fn test_context_get() {
        let config = Config {
            plugin_path: PathBuf::from("/nonexistent"),
            ..Config::default()
        };
        let mut context = Context::new(config);

        let factory: Factory<Greeter> = Box::new(|name| Ok(format!("hello, {name}")));
        context
            .repository_mut()
            .insert::<Greeter>("hello", factory)
            .unwrap();

        let greeting = context.get::<Greeter>("hello", &"world".into()).unwrap();
        assert_eq!(greeting, "hello, world");
    }
}
