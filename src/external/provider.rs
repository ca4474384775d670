use crate::error::UpstreamError;
use crate::signal::{from_future, Signal};
use futures::future::LocalBoxFuture;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Failures at the module provider boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// The module did not register within the configured wait.
    #[error("timeout loading module {name}")]
    Timeout {
        /// Requested module
        name: String,
    },

    /// The module could not be loaded.
    #[error("error loading module {name}: {reason}")]
    Load {
        /// Requested module
        name: String,
        /// What went wrong
        reason: String,
    },

    /// A registration without a name could not be matched to a single
    /// pending request.
    #[error("ambiguous anonymous module ({pending} pending requests)")]
    Ambiguous {
        /// Requests it could have belonged to
        pending: usize,
    },
}

impl From<ProviderError> for UpstreamError {
    fn from(err: ProviderError) -> Self {
        UpstreamError::new(err.to_string())
    }
}

/// Module provider settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// How long a request may wait for its module, in milliseconds.
    pub wait_ms: u64,
    /// Prefix of every module path.
    pub base_url: String,
    /// Per-module path overrides.
    pub paths: IndexMap<String, String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            wait_ms: 7000,
            base_url: String::new(),
            paths: IndexMap::new(),
        }
    }
}

impl ProviderConfig {
    /// The wait as a duration.
    pub fn wait(&self) -> Duration {
        Duration::from_millis(self.wait_ms)
    }

    /// Where the code for `name` lives.
    pub fn path_for(&self, name: &str) -> String {
        let path = self.paths.get(name).map(String::as_str).unwrap_or(name);
        format!("{}{}.js", self.base_url, path)
    }
}

/// A module whose factory has run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    /// Registered name.
    pub name: String,
    /// Whatever the factory produced.
    pub exports: Value,
}

/// Something that can hand out modules by name.
pub trait ModuleProvider {
    /// Resolve once the module named `name` has been registered.
    fn request(&self, name: &str) -> LocalBoxFuture<'static, Result<Module, ProviderError>>;
}

/// Request `name` from `provider` as a one-shot signal.
///
/// The signal finishes with the module, or fails with
/// [`ProviderError::Timeout`] once `config.wait_ms` has passed.
///
/// # Panics
///
/// Panics if called outside a tokio `LocalSet`.
pub fn load<P>(provider: &P, name: &str, config: &ProviderConfig) -> Signal<Module>
where
    P: ModuleProvider + ?Sized,
{
    let request = provider.request(name);
    let wait = config.wait();
    let name = name.to_string();
    tracing::debug!(module = %name, ?wait, "module requested");
    from_future(async move {
        match tokio::time::timeout(wait, request).await {
            Ok(Ok(module)) => Ok(module),
            Ok(Err(err)) => Err(err.into()),
            Err(_) => {
                tracing::warn!(module = %name, "module request timed out");
                Err(ProviderError::Timeout { name }.into())
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::pipeline::flow;
    use crate::reducer::{fold, Destination};
    use crate::source::reduce;
    use crate::transducer::wait;
    use serde_json::json;
    use std::cell::RefCell;
    use tokio::task::LocalSet;

    /// In-memory provider: factories run once their dependencies are registered.
    #[derive(Default)]
    struct Registry {
        slots: RefCell<IndexMap<String, Signal<Module>>>,
    }

    impl Registry {
        fn slot(&self, name: &str) -> Signal<Module> {
            self.slots
                .borrow_mut()
                .entry(name.to_string())
                .or_insert_with(Signal::new)
                .clone()
        }

        fn define<F>(&self, name: &str, deps: &[&str], factory: F)
        where
            F: FnOnce(Vec<Value>) -> Value + 'static,
        {
            let target = self.slot(name);
            let order: Vec<String> = deps.iter().map(|dep| dep.to_string()).collect();
            let sources: Vec<Signal<Module>> = deps.iter().map(|dep| self.slot(dep)).collect();
            let name = name.to_string();

            let gathered = flow(sources)
                .cat_with(wait())
                .map(|module: Module| (module.name, module.exports))
                .to(IndexMap::new())
                .unwrap();
            gathered.into_completion().on_ready(move |result| {
                let mut exports = result.unwrap();
                let args = order
                    .iter()
                    .map(|dep| exports.swap_remove(dep).unwrap_or(Value::Null))
                    .collect();
                target
                    .finish(Module {
                        name,
                        exports: factory(args),
                    })
                    .unwrap();
            });
        }
    }

    impl ModuleProvider for Registry {
        fn request(&self, name: &str) -> LocalBoxFuture<'static, Result<Module, ProviderError>> {
            let found = reduce(self.slot(name), fold(None, |_, module: Module| Some(module)));
            let name = name.to_string();
            Box::pin(async move {
                let load_error = |err: Error| ProviderError::Load {
                    name: name.clone(),
                    reason: err.to_string(),
                };
                let module = found.map_err(load_error)?.await.map_err(load_error)?;
                module.ok_or_else(|| ProviderError::Load {
                    name: name.clone(),
                    reason: "closed without registering".to_string(),
                })
            })
        }
    }

    #[test]
    fn config_defaults_and_paths() {
        let config: ProviderConfig = serde_json::from_value(json!({
            "base_url": "/js/",
            "paths": {"app": "bundle/app"}
        }))
        .unwrap();
        assert_eq!(config.wait_ms, 7000);
        assert_eq!(config.path_for("app"), "/js/bundle/app.js");
        assert_eq!(config.path_for("util"), "/js/util.js");
    }

    #[test]
    fn provider_errors_flow_as_upstream_errors() {
        let err: UpstreamError = ProviderError::Ambiguous { pending: 2 }.into();
        assert_eq!(err.message(), "ambiguous anonymous module (2 pending requests)");
    }

    #[tokio::test(start_paused = true)]
    async fn load_delivers_module_once_dependencies_resolve() {
        LocalSet::new()
            .run_until(async {
                let registry = Registry::default();
                registry.define("app", &["a", "b"], |deps| json!([deps[0], deps[1]]));
                let signal = load(&registry, "app", &ProviderConfig::default());

                registry.define("b", &[], |_| json!(2));
                registry.define("a", &[], |_| json!(1));

                let out = reduce(signal, Vec::<Module>::new().into_reducer()).unwrap();
                let modules = out.await.unwrap();
                assert_eq!(modules.len(), 1);
                assert_eq!(modules[0].exports, json!([1, 2]));
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn load_times_out() {
        LocalSet::new()
            .run_until(async {
                let registry = Registry::default();
                let config = ProviderConfig {
                    wait_ms: 50,
                    ..ProviderConfig::default()
                };
                let signal = load(&registry, "missing", &config);
                let out = reduce(signal, Vec::<Module>::new().into_reducer()).unwrap();

                let err = out.await.unwrap_err();
                let expected: UpstreamError = ProviderError::Timeout {
                    name: "missing".into(),
                }
                .into();
                assert_eq!(err, Error::Upstream(expected));
            })
            .await;
    }
}
