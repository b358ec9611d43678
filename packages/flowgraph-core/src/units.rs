/*
 * Unit resolution
 *
 * Units partition the method universe into independently schedulable
 * shards; the Manager spawns one Runner per unit. A resolver is a
 * stateless pure function method -> UnitId and must be consistent across a
 * run: resolving the same method twice yields equal ids.
 *
 * Built-in granularities: per-method, per-class (optionally collapsed to
 * the outermost enclosing class), per-package, and singleton. Custom
 * resolvers are any other impl of UnitResolver.
 */

use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

use crate::errors::ConfigError;

/// Opaque scheduling shard. Two methods with equal unit id are analysed by
/// the same Runner.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum UnitId<M> {
    Method(M),
    Class(String),
    Package(String),
    Singleton,
    Unknown,
}

/// Maps each method to its scheduling unit.
pub trait UnitResolver<M>: Send + Sync {
    fn resolve(&self, method: &M) -> UnitId<M>;
}

/// Structural metadata the class/package resolvers need. Method types that
/// cannot provide it should stick to the method or singleton resolvers.
pub trait MethodMeta {
    /// Enclosing package, e.g. "com.acme".
    fn package_name(&self) -> &str;

    /// Enclosing class. Nested classes use the `Outer$Inner` convention.
    fn class_name(&self) -> &str;
}

/// One unit per method.
#[derive(Debug, Clone, Copy, Default)]
pub struct MethodUnitResolver;

impl<M: Clone> UnitResolver<M> for MethodUnitResolver {
    fn resolve(&self, method: &M) -> UnitId<M> {
        UnitId::Method(method.clone())
    }
}

/// One unit per class; `outermost` collapses nested classes into their
/// outermost enclosing class.
#[derive(Debug, Clone, Copy)]
pub struct ClassUnitResolver {
    outermost: bool,
}

impl ClassUnitResolver {
    pub fn new() -> Self {
        Self { outermost: false }
    }

    pub fn outermost() -> Self {
        Self { outermost: true }
    }
}

impl Default for ClassUnitResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: MethodMeta> UnitResolver<M> for ClassUnitResolver {
    fn resolve(&self, method: &M) -> UnitId<M> {
        let class = method.class_name();
        if class.is_empty() {
            return UnitId::Unknown;
        }
        let class = if self.outermost {
            class.split('$').next().unwrap_or(class)
        } else {
            class
        };
        let package = method.package_name();
        if package.is_empty() {
            UnitId::Class(class.to_string())
        } else {
            UnitId::Class(format!("{}.{}", package, class))
        }
    }
}

/// One unit per package.
#[derive(Debug, Clone, Copy, Default)]
pub struct PackageUnitResolver;

impl<M: MethodMeta> UnitResolver<M> for PackageUnitResolver {
    fn resolve(&self, method: &M) -> UnitId<M> {
        let package = method.package_name();
        if package.is_empty() {
            UnitId::Unknown
        } else {
            UnitId::Package(package.to_string())
        }
    }
}

/// One unit for everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingletonUnitResolver;

impl<M> UnitResolver<M> for SingletonUnitResolver {
    fn resolve(&self, _method: &M) -> UnitId<M> {
        UnitId::Singleton
    }
}

/// Select a built-in resolver by name: `method`, `class`, `package` or
/// `singleton`. Unknown names fail fast.
pub fn resolver_from_name<M>(name: &str) -> Result<Arc<dyn UnitResolver<M>>, ConfigError>
where
    M: MethodMeta + Clone + Send + Sync + 'static,
{
    match name {
        "method" => Ok(Arc::new(MethodUnitResolver)),
        "class" => Ok(Arc::new(ClassUnitResolver::new())),
        "package" => Ok(Arc::new(PackageUnitResolver)),
        "singleton" => Ok(Arc::new(SingletonUnitResolver)),
        other => Err(ConfigError::UnknownResolver(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq, Hash)]
    struct TestMethod {
        package: String,
        class: String,
        name: String,
    }

    impl TestMethod {
        fn new(package: &str, class: &str, name: &str) -> Self {
            Self {
                package: package.to_string(),
                class: class.to_string(),
                name: name.to_string(),
            }
        }
    }

    impl MethodMeta for TestMethod {
        fn package_name(&self) -> &str {
            &self.package
        }

        fn class_name(&self) -> &str {
            &self.class
        }
    }

    #[test]
    fn test_method_resolver_distinguishes_methods() {
        let r = MethodUnitResolver;
        let a = TestMethod::new("p", "C", "a");
        let b = TestMethod::new("p", "C", "b");

        assert_ne!(r.resolve(&a), r.resolve(&b));
        assert_eq!(r.resolve(&a), r.resolve(&a));
    }

    #[test]
    fn test_class_resolver_groups_by_class() {
        let r = ClassUnitResolver::new();
        let a = TestMethod::new("p", "C", "a");
        let b = TestMethod::new("p", "C", "b");
        let c = TestMethod::new("p", "D", "a");

        assert_eq!(r.resolve(&a), r.resolve(&b));
        assert_ne!(r.resolve(&a), r.resolve(&c));
        assert_eq!(r.resolve(&a), UnitId::Class("p.C".to_string()));
    }

    #[test]
    fn test_class_resolver_outermost_collapses_nested() {
        let r = ClassUnitResolver::outermost();
        let outer = TestMethod::new("p", "C", "a");
        let inner = TestMethod::new("p", "C$Inner", "b");

        assert_eq!(r.resolve(&outer), r.resolve(&inner));
    }

    #[test]
    fn test_package_resolver() {
        let r = PackageUnitResolver;
        let a = TestMethod::new("p", "C", "a");
        let b = TestMethod::new("p", "D", "b");
        let c = TestMethod::new("q", "C", "a");

        assert_eq!(r.resolve(&a), r.resolve(&b));
        assert_ne!(r.resolve(&a), r.resolve(&c));
    }

    #[test]
    fn test_singleton_resolver() {
        let r = SingletonUnitResolver;
        let a = TestMethod::new("p", "C", "a");
        let b = TestMethod::new("q", "D", "b");

        assert_eq!(r.resolve(&a), r.resolve(&b));
        assert_eq!(UnitResolver::<TestMethod>::resolve(&r, &a), UnitId::Singleton);
    }

    #[test]
    fn test_resolver_from_name() {
        assert!(resolver_from_name::<TestMethod>("method").is_ok());
        assert!(resolver_from_name::<TestMethod>("class").is_ok());
        assert!(resolver_from_name::<TestMethod>("package").is_ok());
        assert!(resolver_from_name::<TestMethod>("singleton").is_ok());

        match resolver_from_name::<TestMethod>("file") {
            Err(err) => assert!(matches!(err, ConfigError::UnknownResolver(_))),
            Ok(_) => panic!("expected an error"),
        }
    }

    #[test]
    fn test_empty_metadata_maps_to_unknown() {
        let m = TestMethod::new("", "", "lambda$0");

        assert_eq!(
            UnitResolver::<TestMethod>::resolve(&ClassUnitResolver::new(), &m),
            UnitId::Unknown
        );
        assert_eq!(
            UnitResolver::<TestMethod>::resolve(&PackageUnitResolver, &m),
            UnitId::Unknown
        );
    }
}
