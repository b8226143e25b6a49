use crate::builder::AstBuilder;
use crate::cache::{ArtifactCache, CacheStats};
use crate::compiler::{CompiledExpression, Compiler};
use crate::config::{ContextLayout, EngineConfig};
use crate::context::{ArrayContext, Context, MapContext, Var};
use crate::error::FelResult;
use crate::function::{Function, FunctionRegistry};
use crate::grammar::parse;
use crate::host::HostRegistry;
use crate::node::Node;
use crate::optimizer::{self, Optimizer, VarShortcut};
use crate::runtime::Runtime;
use crate::security::SecurityManager;
use fel_types::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Separates expression text from optimizer keys in cache keys
const KEY_SEPARATOR: char = '\u{1f}';

/// Main entry point: parsing, interpretation and compilation of expressions
pub struct FelEngine {
    config: EngineConfig,
    registry: FunctionRegistry,
    context: Box<dyn Context>,
    runtime: Runtime,
    cache: ArtifactCache,
    compiler: Compiler,
}

impl Default for FelEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FelEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FelEngine")
            .field("config", &self.config)
            .field("functions", &self.registry.len())
            .field("cache", &self.cache.stats())
            .finish()
    }
}

impl FelEngine {
    /// Create an engine with double precision operators
    #[instrument]
    pub fn new() -> Self {
        Self::from_config(EngineConfig::default())
    }

    /// Create an engine with arbitrary precision operators
    #[instrument]
    pub fn big_number() -> Self {
        Self::from_config(EngineConfig::big_number(crate::config::DEFAULT_DECIMAL_PRECISION))
    }

    /// Big-number engine keeping `decimal_precision` fractional digits on division
    #[instrument]
    pub fn big_number_with_precision(decimal_precision: u32) -> Self {
        Self::from_config(EngineConfig::big_number(decimal_precision))
    }

    /// Create an engine from a validated configuration
    #[instrument(skip(config))]
    pub fn with_config(config: EngineConfig) -> FelResult<Self> {
        config.validate()?;
        Ok(Self::from_config(config))
    }

    fn from_config(config: EngineConfig) -> Self {
        info!(
            numeric = ?config.numeric,
            decimal_precision = config.decimal_precision,
            context_layout = ?config.context_layout,
            cache_enabled = config.cache.enabled,
            "Creating FEL engine"
        );

        let registry = FunctionRegistry::with_builtins(config.numeric, config.decimal_precision);
        let runtime = Runtime::new(
            Arc::new(SecurityManager::from_config(&config.security)),
            Arc::new(HostRegistry::with_builtins()),
        );
        let context: Box<dyn Context> = match config.context_layout {
            ContextLayout::Array => Box::new(ArrayContext::new()),
            ContextLayout::Map => Box::new(MapContext::new()),
        };

        Self {
            cache: ArtifactCache::new(&config.cache),
            compiler: Compiler::new(config.max_depth),
            config,
            registry,
            context,
            runtime,
        }
    }

    /// Parse `text` into a node tree
    #[instrument(skip(self))]
    pub fn parse(&self, text: &str) -> FelResult<Node> {
        let expr = parse(text, self.config.max_depth)?;
        AstBuilder::new(&self.registry, self.config.numeric).build(&expr)
    }

    /// Parse and interpret `text` against the default context
    pub fn eval(&self, text: &str) -> FelResult<Value> {
        self.eval_in(text, self.context.as_ref())
    }

    /// Parse and interpret `text` against `ctx`
    #[instrument(skip(self, ctx))]
    pub fn eval_in(&self, text: &str, ctx: &dyn Context) -> FelResult<Value> {
        let node = self.parse(text)?;
        node.eval(ctx, &self.runtime)
    }

    /// Interpret `text` with `vars` bound over the default context
    #[instrument(skip(self, vars))]
    pub fn eval_with_vars<I, K, V>(&self, text: &str, vars: I) -> FelResult<Value>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let shortcut = VarShortcut::new(Self::var_map(vars));
        let node = self.parse(text)?;
        let ctx = self.context.as_ref();
        let node = shortcut.optimize(ctx, &self.runtime, node);
        node.eval(ctx, &self.runtime)
    }

    /// Compile `text` after applying `optimizers` against `ctx`, or against the
    /// default context when `ctx` is `None`
    ///
    /// The artifact is cached when every optimizer has a cache key.
    #[instrument(skip(self, ctx, optimizers), fields(optimizers = optimizers.len()))]
    pub fn compile(
        &self,
        text: &str,
        ctx: Option<&dyn Context>,
        optimizers: &[&dyn Optimizer],
    ) -> FelResult<Arc<CompiledExpression>> {
        let ctx = ctx.unwrap_or(self.context.as_ref());
        let build = || {
            let node = optimizer::apply(self.parse(text)?, ctx, &self.runtime, optimizers);
            self.compiler.compile(text, &node, self.runtime.clone())
        };

        match Self::cache_key(text, optimizers) {
            Some(key) => self.cache.get_or_build(&key, build),
            None => {
                debug!(expression = text, "Optimizers bind live values; compiling uncached");
                build().map(Arc::new)
            }
        }
    }

    /// Compile `text` with `vars` bound to the artifact
    ///
    /// The artifact reads `vars` directly; setting them changes the result of
    /// the next execution.
    pub fn compile_with_vars(
        &self,
        text: &str,
        vars: &[Arc<Var>],
    ) -> FelResult<Arc<CompiledExpression>> {
        self.compile(text, None, &[&VarShortcut::from_vars(vars)])
    }

    fn cache_key(text: &str, optimizers: &[&dyn Optimizer]) -> Option<String> {
        let keys = optimizers.iter().map(|o| o.cache_key()).collect::<Option<Vec<_>>>()?;
        if keys.is_empty() {
            Some(text.to_string())
        } else {
            Some(format!("{text}{KEY_SEPARATOR}{}", keys.join("|")))
        }
    }

    fn var_map<I, K, V>(vars: I) -> HashMap<String, Arc<Var>>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        vars.into_iter()
            .map(|(name, value)| {
                let name = name.into();
                let var = Var::shared(name.clone(), value);
                (name, var)
            })
            .collect()
    }

    /// Register or replace a function, returning the one it replaced
    ///
    /// Cached artifacts are dropped since they may have resolved the old one.
    #[instrument(skip(self, function), fields(name = function.name()))]
    pub fn add_function(&mut self, function: Arc<dyn Function>) -> Option<Arc<dyn Function>> {
        let previous = self.registry.register(function);
        self.cache.clear();
        info!(replaced = previous.is_some(), "Registered function");
        previous
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Long-lived default context
    pub fn context(&self) -> &dyn Context {
        self.context.as_ref()
    }

    pub fn context_mut(&mut self) -> &mut dyn Context {
        self.context.as_mut()
    }

    pub fn security_manager(&self) -> &SecurityManager {
        self.runtime.security()
    }

    /// Replace the security policy and drop cached artifacts built under the old one
    pub fn set_security_manager(&mut self, security: SecurityManager) {
        self.runtime.set_security(Arc::new(security));
        self.cache.clear();
        info!("Replaced security manager");
    }

    /// Host types reachable through `$('Type')`; drops cached artifacts
    pub fn hosts_mut(&mut self) -> &mut HostRegistry {
        self.cache.clear();
        self.runtime.hosts_mut()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NumericMode;
    use crate::error::FelError;
    use crate::function::Arguments;
    use crate::optimizer::ConstantFolding;

    #[test]
    fn test_default_context_layout() {
        let mut engine = FelEngine::new();
        engine.context_mut().set("a", Value::Int(2));
        assert_eq!(engine.eval("a * 21").unwrap(), Value::Int(42));

        let config = EngineConfig { context_layout: ContextLayout::Map, ..EngineConfig::default() };
        let mut engine = FelEngine::with_config(config).unwrap();
        engine.context_mut().set("a", Value::Int(3));
        assert_eq!(engine.eval("a").unwrap(), Value::Int(3));
    }

    #[test]
    fn test_eval_with_vars_overlays_default_context() {
        let mut engine = FelEngine::new();
        engine.context_mut().set("b", Value::Int(1));
        let result = engine.eval_with_vars("a + b", [("a", 10)]).unwrap();
        assert_eq!(result, Value::Int(11));
        assert!(!engine.context().contains("a"));
    }

    #[test]
    fn test_compile_cache_keys() {
        let engine = FelEngine::new();
        let a = engine.compile("1 + 2", None, &[]).unwrap();
        let b = engine.compile("1 + 2", None, &[]).unwrap();
        let c = engine.compile("1 + 2", None, &[&ConstantFolding::with_calls()]).unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(c.source(), "3");
        assert_eq!(engine.cache_stats().entries, 2);
    }

    #[test]
    fn test_compile_with_vars_is_uncached() {
        let engine = FelEngine::new();
        let x = Var::shared("x", 1);
        let compiled = engine.compile_with_vars("x + 1", &[Arc::clone(&x)]).unwrap();
        x.set(41);
        assert_eq!(compiled.eval(engine.context()).unwrap(), Value::Int(42));
        assert_eq!(engine.cache_stats().entries, 0);
    }

    #[test]
    fn test_add_function_clears_cache() {
        struct Twice;
        impl Function for Twice {
            fn name(&self) -> &str {
                "twice"
            }
            fn call(&self, args: &dyn Arguments) -> FelResult<Value> {
                match args.eval(0)? {
                    Value::Int(i) => Ok(Value::Int(i * 2)),
                    other => Err(FelError::eval_with_operands("twice", &[&other], "expected int")),
                }
            }
        }

        let mut engine = FelEngine::new();
        let before = engine.compile("twice(4)", None, &[]).unwrap();
        assert!(before.eval(engine.context()).is_err());

        assert!(engine.add_function(Arc::new(Twice)).is_none());
        assert_eq!(engine.cache_stats().entries, 0);
        let after = engine.compile("twice(4)", None, &[]).unwrap();
        assert_eq!(after.eval(engine.context()).unwrap(), Value::Int(8));
        assert_eq!(engine.eval("twice(5)").unwrap(), Value::Int(10));
    }

    #[test]
    fn test_security_manager_swap() {
        let mut engine = FelEngine::new();
        assert!(matches!(engine.eval("$('Process').id()"), Err(FelError::Security { .. })));

        engine.set_security_manager(SecurityManager::permissive());
        assert!(engine.eval("$('Process').id()").is_ok());
        assert!(engine.security_manager().is_callable("File.read"));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = EngineConfig { max_depth: 0, ..EngineConfig::default() };
        assert!(matches!(FelEngine::with_config(config), Err(FelError::Config { .. })));
        assert_eq!(FelEngine::big_number().config().numeric, NumericMode::Big);
    }
}
