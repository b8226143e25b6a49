//! Services available to functions while an expression runs

use crate::error::{FelError, FelResult};
use crate::host::{HostRegistry, receiver_type};
use crate::security::SecurityManager;
use fel_types::Value;
use std::sync::Arc;
use tracing::trace;

/// Security policy and host types shared by every evaluation of an engine
#[derive(Debug, Clone)]
pub struct Runtime {
    security: Arc<SecurityManager>,
    hosts: Arc<HostRegistry>,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new(Arc::new(SecurityManager::default()), Arc::new(HostRegistry::with_builtins()))
    }
}

impl Runtime {
    pub fn new(security: Arc<SecurityManager>, hosts: Arc<HostRegistry>) -> Self {
        Self { security, hosts }
    }

    pub fn security(&self) -> &SecurityManager {
        &self.security
    }

    pub fn hosts(&self) -> &HostRegistry {
        &self.hosts
    }

    pub(crate) fn set_security(&mut self, security: Arc<SecurityManager>) {
        self.security = security;
    }

    /// Copy-on-write access; artifacts built earlier keep the old registry
    pub(crate) fn hosts_mut(&mut self) -> &mut HostRegistry {
        Arc::make_mut(&mut self.hosts)
    }

    /// Handle to a host type, checked against the security policy
    pub fn host_handle(&self, name: &str) -> FelResult<Value> {
        self.security.check(name)?;
        if self.hosts.contains(name) {
            Ok(Value::host(name))
        } else {
            Err(FelError::eval("$", format!("unknown host type `{name}`")))
        }
    }

    /// Invoke `method` on a host type after checking `Type.method`
    pub fn invoke(&self, host: &str, method: &str, args: &[Value]) -> FelResult<Value> {
        let target = format!("{host}.{method}");
        self.security.check(&target)?;

        let host_type = self
            .hosts
            .get(host)
            .ok_or_else(|| FelError::eval(&target, format!("unknown host type `{host}`")))?;
        trace!(target_name = %target, args = args.len(), "Dispatching host call");
        host_type.invoke(method, args)
    }

    /// Call `method` on a receiver value
    ///
    /// Host handles dispatch to their type with the remaining arguments;
    /// strings, lists and maps pass themselves as the first argument.
    pub fn invoke_method(&self, receiver: &Value, method: &str, args: &[Value]) -> FelResult<Value> {
        let host = receiver_type(receiver).ok_or_else(|| {
            FelError::eval_with_operands(
                &format!(".{method}"),
                &[receiver],
                format!("{} has no methods", receiver.type_name()),
            )
        })?;

        if matches!(receiver, Value::Host(_)) {
            self.invoke(host, method, args)
        } else {
            let mut full = Vec::with_capacity(args.len() + 1);
            full.push(receiver.clone());
            full.extend_from_slice(args);
            self.invoke(host, method, &full)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_runtime_denies_system() {
        let runtime = Runtime::default();
        let err = runtime.invoke("System", "getenv", &[Value::str("HOME")]).unwrap_err();
        assert_eq!(err, FelError::security("System.getenv"));

        let err = runtime.host_handle("File").unwrap_err();
        assert_eq!(err.category(), "security");
    }

    #[test]
    fn test_method_on_receiver() {
        let runtime = Runtime::default();
        let result = runtime.invoke_method(&Value::str("abc"), "upper", &[]).unwrap();
        assert_eq!(result, Value::str("ABC"));

        let math = runtime.host_handle("Math").unwrap();
        let result = runtime.invoke_method(&math, "min", &[Value::Int(1), Value::Int(2)]).unwrap();
        assert_eq!(result, Value::Int(1));
    }

    #[test]
    fn test_permissive_runtime_allows_process() {
        let runtime = Runtime::new(
            Arc::new(SecurityManager::permissive()),
            Arc::new(HostRegistry::with_builtins()),
        );
        assert!(runtime.invoke("Process", "id", &[]).is_ok());
        assert!(runtime.invoke_method(&Value::Int(1), "x", &[]).is_err());
    }
}
