//! Resource registry (`spec.md` §4.5) and the dispatch-table substitute for
//! reflected invocation (`spec.md` §9 "Reflected invocation → dispatch
//! table"). A `ServiceDescriptor` is built once at registration time and
//! carries its own `methodName(signature) -> handler` map, so overload
//! resolution at request time is a direct key lookup.

use crate::error::{ProtocolError, ServiceError};
use crate::mapper::is_builtin_mappable;
use crate::signature::{dispatch_key, parse_signature};
use crate::value::Value;
use log::warn;
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

pub type MethodHandler = Arc<dyn Fn(&(dyn Any + Send + Sync), &[Value]) -> Result<Value, ServiceError> + Send + Sync>;

enum Instance {
    /// A retained, stateful instance shared across calls.
    Singleton(Arc<dyn Any + Send + Sync>),
    /// A factory invoked fresh for every call (Rust substitute for "no-arg
    /// constructor, instantiated per call").
    Class(Arc<dyn Fn() -> Result<Arc<dyn Any + Send + Sync>, ProtocolError> + Send + Sync>),
}

pub struct ServiceDescriptor {
    canonical_name: String,
    interfaces: Vec<String>,
    instance: Instance,
    methods: HashMap<String, MethodHandler>,
}

impl ServiceDescriptor {
    pub fn canonical_name(&self) -> &str {
        &self.canonical_name
    }

    pub fn implements(&self, interface: &str) -> bool {
        self.interfaces.iter().any(|i| i == interface)
    }

    pub fn is_singleton(&self) -> bool {
        matches!(self.instance, Instance::Singleton(_))
    }

    /// Resolves the fresh-or-retained instance for one call.
    fn instance(&self) -> Result<Arc<dyn Any + Send + Sync>, ProtocolError> {
        match &self.instance {
            Instance::Singleton(inst) => Ok(inst.clone()),
            Instance::Class(factory) => factory(),
        }
    }

    /// `findMethod` equivalent: exact `methodName(signature)` lookup.
    pub fn find_method(&self, method: &str, signature: &str) -> Option<&MethodHandler> {
        self.methods.get(&dispatch_key(method, signature))
    }

    pub fn invoke(
        &self,
        method: &str,
        signature: &str,
        params: &[Value],
    ) -> Result<Value, InvokeOutcome> {
        let handler = self
            .find_method(method, signature)
            .ok_or_else(|| InvokeOutcome::Protocol(ProtocolError::UnknownMethod {
                class: self.canonical_name.clone(),
                method: method.to_string(),
                signature: signature.to_string(),
            }))?;
        let instance = self.instance().map_err(InvokeOutcome::Protocol)?;
        handler(instance.as_ref(), params).map_err(InvokeOutcome::Service)
    }
}

/// What an invocation can fail with, before the server pipeline classifies
/// it into a status code (`spec.md` §4.6).
pub enum InvokeOutcome {
    Protocol(ProtocolError),
    Service(ServiceError),
}

/// Builds a [`ServiceDescriptor`] for a concrete resource type `T`.
pub struct ServiceBuilder<T> {
    canonical_name: String,
    interfaces: Vec<String>,
    methods: HashMap<String, MethodHandler>,
    _marker: std::marker::PhantomData<T>,
}

impl<T: Any + Send + Sync + 'static> ServiceBuilder<T> {
    pub fn new(canonical_name: impl Into<String>) -> Self {
        ServiceBuilder {
            canonical_name: canonical_name.into(),
            interfaces: Vec::new(),
            methods: HashMap::new(),
            _marker: std::marker::PhantomData,
        }
    }

    pub fn implements(mut self, interface: impl Into<String>) -> Self {
        self.interfaces.push(interface.into());
        self
    }

    /// Registers `name(signature) -> handler` and, per `spec.md` §4.5,
    /// warns (without failing) about any parameter type with no built-in
    /// mapper — it still works at call time via a user mapper or
    /// `Value::Bytes` auto-serialization, but neither is automatic the way
    /// reflection-based serialization is. Only parameter types are checked:
    /// the wire signature carries no return-type descriptor to validate.
    pub fn method<F>(mut self, name: &str, signature: &str, handler: F) -> Self
    where
        F: Fn(&T, &[Value]) -> Result<Value, ServiceError> + Send + Sync + 'static,
    {
        match parse_signature(signature) {
            Ok(param_types) => {
                for ty in &param_types {
                    if !is_builtin_mappable(ty) {
                        warn!(
                            "{}.{}{signature}: parameter type {} has no built-in mapper; \
                             register a user mapper or pass Value::Bytes",
                            self.canonical_name,
                            name,
                            ty.canonical_name(),
                        );
                    }
                }
            }
            Err(e) => warn!(
                "{}.{}{signature}: could not parse signature for mappability check: {e}",
                self.canonical_name, name
            ),
        }

        let key = dispatch_key(name, signature);
        let wrapped: MethodHandler = Arc::new(move |any, params| {
            let this = any
                .downcast_ref::<T>()
                .expect("resource registry stored the wrong concrete type");
            handler(this, params)
        });
        self.methods.insert(key, wrapped);
        self
    }

    pub fn build_singleton(self, instance: T) -> ServiceDescriptor {
        ServiceDescriptor {
            canonical_name: self.canonical_name,
            interfaces: self.interfaces,
            instance: Instance::Singleton(Arc::new(instance)),
            methods: self.methods,
        }
    }

    pub fn build_class<F>(self, factory: F) -> ServiceDescriptor
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        let wrapped = move || -> Result<Arc<dyn Any + Send + Sync>, ProtocolError> {
            Ok(Arc::new(factory()))
        };
        ServiceDescriptor {
            canonical_name: self.canonical_name,
            interfaces: self.interfaces,
            instance: Instance::Class(Arc::new(wrapped)),
            methods: self.methods,
        }
    }

    /// Per §4.4: a fallible factory, for resources whose no-arg
    /// constructor can fail (reported as `ProtocolError::Construct`).
    pub fn build_class_fallible<F>(self, factory: F) -> ServiceDescriptor
    where
        F: Fn() -> Result<T, String> + Send + Sync + 'static,
    {
        let canonical = self.canonical_name.clone();
        let wrapped = move || -> Result<Arc<dyn Any + Send + Sync>, ProtocolError> {
            factory()
                .map(|v| Arc::new(v) as Arc<dyn Any + Send + Sync>)
                .map_err(|_| ProtocolError::Construct(canonical.clone()))
        };
        ServiceDescriptor {
            canonical_name: self.canonical_name,
            interfaces: self.interfaces,
            instance: Instance::Class(Arc::new(wrapped)),
            methods: self.methods,
        }
    }
}

/// Holds singleton instances and class-only registrations, keyed by
/// canonical class name (`spec.md` §3 "Resource registry").
#[derive(Default)]
pub struct ResourceRegistry {
    singletons: RwLock<HashMap<String, Arc<ServiceDescriptor>>>,
    classes: RwLock<HashMap<String, Arc<ServiceDescriptor>>>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `addResource`: a name may appear in at most one map at a time;
    /// re-registration replaces. Registering under `classes` evicts any
    /// prior `singletons` entry of the same name and vice versa.
    pub fn add_resource(&self, descriptor: ServiceDescriptor) {
        let name = descriptor.canonical_name().to_string();
        self.singletons.write().expect("registry poisoned").remove(&name);
        self.classes
            .write()
            .expect("registry poisoned")
            .insert(name, Arc::new(descriptor));
    }

    pub fn add_singleton_resource(&self, descriptor: ServiceDescriptor) {
        let name = descriptor.canonical_name().to_string();
        self.classes.write().expect("registry poisoned").remove(&name);
        self.singletons
            .write()
            .expect("registry poisoned")
            .insert(name, Arc::new(descriptor));
    }

    pub fn delete_resource(&self, canonical_name: &str) {
        self.classes.write().expect("registry poisoned").remove(canonical_name);
    }

    pub fn delete_singleton_resource(&self, canonical_name: &str) {
        self.singletons
            .write()
            .expect("registry poisoned")
            .remove(canonical_name);
    }

    /// Singleton hits take precedence over class-only hits. When `name` is
    /// an interface rather than a registered canonical name, the first
    /// resource (singleton scan first) implementing it is returned.
    pub fn get_resource(&self, name: &str) -> Option<Arc<ServiceDescriptor>> {
        let singletons = self.singletons.read().expect("registry poisoned");
        if let Some(found) = singletons.get(name) {
            return Some(found.clone());
        }
        let classes = self.classes.read().expect("registry poisoned");
        if let Some(found) = classes.get(name) {
            return Some(found.clone());
        }
        for d in singletons.values() {
            if d.implements(name) {
                return Some(d.clone());
            }
        }
        for d in classes.values() {
            if d.implements(name) {
                return Some(d.clone());
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Calculator;

    fn build_calculator() -> ServiceDescriptor {
        ServiceBuilder::<Calculator>::new("com.example.Calculator")
            .method("add", "(II)", |_, params| {
                Ok(Value::Int(params[0].as_i32()? + params[1].as_i32()?))
            })
            .method("add", "(DD)", |_, params| {
                Ok(Value::Double(params[0].as_f64()? + params[1].as_f64()?))
            })
            .build_singleton(Calculator)
    }

    #[test]
    fn overload_resolution_by_signature() {
        let registry = ResourceRegistry::new();
        registry.add_singleton_resource(build_calculator());
        let d = registry.get_resource("com.example.Calculator").unwrap();

        let result = d
            .invoke("add", "(II)", &[Value::Int(5), Value::Int(3)])
            .map_err(|_| ())
            .unwrap();
        assert_eq!(result, Value::Int(8));

        let result = d
            .invoke("add", "(DD)", &[Value::Double(5.5), Value::Double(3.3)])
            .map_err(|_| ())
            .unwrap();
        assert_eq!(result, Value::Double(8.8));
    }

    #[test]
    fn singleton_replaces_class_registration() {
        let registry = ResourceRegistry::new();
        registry.add_resource(build_calculator());
        assert!(!registry.get_resource("com.example.Calculator").unwrap().is_singleton());
        registry.add_singleton_resource(build_calculator());
        assert!(registry.get_resource("com.example.Calculator").unwrap().is_singleton());
    }

    #[test]
    fn interface_resolves_to_implementation() {
        let registry = ResourceRegistry::new();
        let d = ServiceBuilder::<Calculator>::new("com.example.CalculatorImpl")
            .implements("com.example.Calculator")
            .method("add", "(II)", |_, params| {
                Ok(Value::Int(params[0].as_i32()? + params[1].as_i32()?))
            })
            .build_singleton(Calculator);
        registry.add_singleton_resource(d);
        let found = registry.get_resource("com.example.Calculator").unwrap();
        assert_eq!(found.canonical_name(), "com.example.CalculatorImpl");
    }
}
