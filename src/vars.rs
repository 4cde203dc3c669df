//! Variable resolvers.
//!
//! Configured paths and candidate lists may contain `${VAR}` references. This module contains the resolvers for
//! installer variables (`AI_*`) and process environment variables (`env.*`), and the expander applying them.

use std::borrow::Cow;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::rc::Rc;

/// Variable holding the application name.
pub(crate) const VAR_NAME: &str = "AI_NAME";

/// Variable holding the user's data directory (`$XDG_DATA_HOME` or `~/.local/share`).
pub(crate) const VAR_DATA_DIR: &str = "AI_DATA_DIR";

/// Variable holding the user's home directory.
pub(crate) const VAR_HOME: &str = "AI_HOME";

/// Variable holding the working directory.
pub(crate) const VAR_WORKDIR: &str = "AI_WORKDIR";

/// Variable holding the resolved applications directory.
pub(crate) const VAR_APPLICATIONS_DIR: &str = "AI_APPLICATIONS_DIR";

/// The error type for operations interacting with variables.
#[cfg_attr(test, derive(PartialEq))]
#[derive(Debug, thiserror::Error)]
pub(crate) enum VarError {
    /// The specified variable is not present.
    #[error("variable '{0}' not found")]
    NotPresent(String),
}

/// Trait for variable resolvers.
pub(crate) trait VarResolver: fmt::Debug {
    /// Resolves the variable with the given name.
    fn resolve_var(&self, var_name: &str) -> Result<String, VarError>;
}

/// [`VarResolver`] implementation that asks other variable resolvers in order.
#[derive(Debug)]
pub(crate) struct CombinedVarResolver {
    resolvers: Vec<Rc<dyn VarResolver>>,
}

impl CombinedVarResolver {
    /// Constructs a new `CombinedVarResolver` with the given variable resolvers.
    pub(crate) fn new<I>(resolvers: I) -> Self
    where
        I: IntoIterator<Item = Rc<dyn VarResolver>>,
    {
        Self {
            resolvers: Vec::from_iter(resolvers),
        }
    }
}

impl VarResolver for CombinedVarResolver {
    #[tracing::instrument(level = "trace", ret)]
    fn resolve_var(&self, v: &str) -> Result<String, VarError> {
        for resolver in &self.resolvers {
            if let Ok(value) = resolver.resolve_var(v) {
                return Ok(value);
            }
        }

        Err(VarError::NotPresent(v.to_owned()))
    }
}

/// [`VarResolver`] implementation for environment variables of the process.
#[derive(Debug)]
pub(crate) struct OsEnvVarResolver;

impl VarResolver for OsEnvVarResolver {
    #[tracing::instrument(level = "trace", ret)]
    fn resolve_var(&self, v: &str) -> Result<String, VarError> {
        env::var(v).map_err(|_| VarError::NotPresent(v.to_owned()))
    }
}

/// [`VarResolver`] that first removes the given prefix from the variable and then delegates to the given resolver.
#[derive(Debug)]
pub(crate) struct PrefixedVarResolver {
    resolver: Rc<dyn VarResolver>,
    prefix: String,
}

impl PrefixedVarResolver {
    /// Constructs a new `PrefixedVarResolver` for the given variable resolver.
    pub(crate) fn new(prefix: impl Into<String>, resolver: Rc<dyn VarResolver>) -> Self {
        Self {
            prefix: prefix.into(),
            resolver,
        }
    }
}

impl VarResolver for PrefixedVarResolver {
    #[tracing::instrument(level = "trace", ret)]
    fn resolve_var(&self, v: &str) -> Result<String, VarError> {
        if let Some(v) = v.strip_prefix(&self.prefix) {
            return self.resolver.resolve_var(v);
        };

        Err(VarError::NotPresent(v.to_owned()))
    }
}

/// [`VarResolver`] implementation for a fixed set of variables.
#[derive(Clone, Debug, Default)]
pub(crate) struct SimpleVarResolver {
    vars: HashMap<String, String>,
}

impl SimpleVarResolver {
    /// Constructs a new, empty `SimpleVarResolver`.
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Registers the value for the given variable name.
    pub(crate) fn insert<N: Into<String>, V: Into<String>>(&mut self, name: N, val: V) {
        self.vars.insert(name.into(), val.into());
    }
}

impl VarResolver for SimpleVarResolver {
    #[tracing::instrument(level = "trace", ret)]
    fn resolve_var(&self, v: &str) -> Result<String, VarError> {
        match self.vars.get(v) {
            Some(value) => Ok(value.clone()),
            _ => Err(VarError::NotPresent(v.to_owned())),
        }
    }
}

/// Expands variables in strings with the help of variable resolvers.
#[derive(Debug)]
pub(crate) struct VarExpander {
    // The array with variable resolvers.
    #[doc(hidden)]
    resolver: CombinedVarResolver,
}

impl VarExpander {
    /// Constructs a new `VarExpander` with the given variable resolvers.
    pub(crate) fn new<I>(resolvers: I) -> Self
    where
        I: IntoIterator<Item = Rc<dyn VarResolver>>,
    {
        Self {
            resolver: CombinedVarResolver::new(resolvers),
        }
    }

    /// Constructs the `VarExpander` used for the configuration: the given installer variables first, then the
    /// process environment with the `env.` prefix.
    pub(crate) fn with_installer_vars(vars: SimpleVarResolver) -> Self {
        let env_var_resolver = PrefixedVarResolver::new("env.", Rc::new(OsEnvVarResolver));
        let var_resolvers: [Rc<dyn VarResolver>; 2] = [Rc::new(vars), Rc::new(env_var_resolver)];
        Self::new(var_resolvers)
    }

    /// Expands all known variables in the given string.
    #[tracing::instrument(level = "trace", ret)]
    pub(crate) fn expand<'a, S>(&self, s: &'a S) -> Result<Cow<'a, str>, VarError>
    where
        S: ?Sized + AsRef<str> + fmt::Debug,
    {
        self.expand_inner(s.as_ref()).map(Cow::Owned)
    }

    // Expands all known variables in the given string, repeating until nothing changes.
    fn expand_inner(&self, s: &str) -> Result<String, VarError> {
        let expanded = shellexpand::env_with_context(s, |s| self.resolve(s)) //
            .map_err(|err| err.cause)? //
            .to_string();

        if expanded == s {
            return Ok(expanded);
        }

        self.expand_inner(&expanded)
    }

    // Provides the context for `expand`.
    #[doc(hidden)]
    fn resolve(&self, v: &str) -> Result<Option<String>, VarError> {
        self.resolver.resolve_var(v).map(Option::Some)
    }
}

#[cfg(test)]
mod tests {

    use super::*;
    use test_log::test;

    #[test]
    fn env_var_resolver_known_var() {
        let expected = env::var("PATH").unwrap();
        let resolver = OsEnvVarResolver;
        let resolved = resolver.resolve_var("PATH").unwrap();
        assert_eq!(resolved, expected);
    }

    #[test]
    fn env_var_resolver_unknown_var() {
        let resolver = OsEnvVarResolver;
        let resolved = resolver.resolve_var("AI_SURELY_NOT_SET_ANYWHERE");
        assert_eq!(resolved, Err(VarError::NotPresent("AI_SURELY_NOT_SET_ANYWHERE".to_string())));
    }

    #[test]
    fn prefixed_var_resolver_requires_prefix() {
        let resolver = PrefixedVarResolver::new("env.", Rc::new(OsEnvVarResolver));
        assert!(resolver.resolve_var("env.PATH").is_ok());
        assert_eq!(resolver.resolve_var("PATH"), Err(VarError::NotPresent("PATH".to_string())));
    }

    #[test]
    fn simple_var_resolver_known_var() {
        let mut resolver = SimpleVarResolver::new();
        resolver.insert(VAR_NAME, "cursor");
        let resolved = resolver.resolve_var(VAR_NAME).unwrap();
        assert_eq!(resolved, "cursor");
    }

    #[test]
    fn simple_var_resolver_unknown_var() {
        let mut resolver = SimpleVarResolver::new();
        resolver.insert(VAR_NAME, "cursor");
        let resolved = resolver.resolve_var("AI_OTHER");
        assert_eq!(resolved, Err(VarError::NotPresent("AI_OTHER".to_string())));
    }

    fn var_expander() -> VarExpander {
        let mut vars = SimpleVarResolver::new();
        vars.insert(VAR_NAME, "cursor");
        vars.insert(VAR_DATA_DIR, "/home/user/.local/share");
        vars.insert(VAR_APPLICATIONS_DIR, "${AI_DATA_DIR}/applications");
        vars.insert("AI_LOOP", "${AI_LOOP}");
        VarExpander::with_installer_vars(vars)
    }

    #[test]
    fn var_expander_known_env_var() {
        let expected = env::var("PATH").unwrap();
        let expanded = var_expander().expand("${env.PATH}").unwrap();
        assert_eq!(expanded, Cow::<str>::Owned(expected));
    }

    #[test]
    fn var_expander_unknown_env_var() {
        let expanded = var_expander().expand("${env.AI_SURELY_NOT_SET_ANYWHERE}");
        assert_eq!(expanded, Err(VarError::NotPresent("env.AI_SURELY_NOT_SET_ANYWHERE".to_string())));
    }

    #[test]
    fn var_expander_candidate_path() {
        let expanded = var_expander().expand("usr/share/applications/${AI_NAME}.desktop").unwrap();
        assert_eq!(expanded, "usr/share/applications/cursor.desktop");
    }

    #[test]
    fn var_expander_nested() {
        let expanded = var_expander().expand("${AI_APPLICATIONS_DIR}").unwrap();
        assert_eq!(expanded, "/home/user/.local/share/applications");
    }

    #[test]
    fn var_expander_self_reference_terminates() {
        let expanded = var_expander().expand("${AI_LOOP}").unwrap();
        assert_eq!(expanded, "${AI_LOOP}");
    }

    #[test]
    fn var_expander_unknown_var() {
        let expanded = var_expander().expand("${AI_XYZ}");
        assert_eq!(expanded, Err(VarError::NotPresent("AI_XYZ".to_string())));
    }
}
