//! Capability contract and implementation identities.
//!
//! A capability is an open generic contract (e.g. "handler of command C")
//! together with a concrete implementation of one closed form of it. These
//! types give both sides a hashable identity that the manifest, scanner,
//! composer, and container all key on.

use std::any::TypeId;
use std::fmt;

/// How many implementations may bind to one closed contract.
///
/// Command and query handlers are single-bound: a second implementation of
/// the same closed contract is a configuration error. Steps are many-bound:
/// a pipeline is built from every step registered for its context type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cardinality {
    Single,
    Many,
}

/// An open generic contract: a shape name plus its type-parameter count.
///
/// Two open contracts are equal iff their shape and arity match;
/// cardinality is binding metadata, not identity.
#[derive(Debug, Clone, Copy)]
pub struct OpenContract {
    shape: &'static str,
    arity: usize,
    cardinality: Cardinality,
}

impl PartialEq for OpenContract {
    fn eq(&self, other: &Self) -> bool {
        self.shape == other.shape && self.arity == other.arity
    }
}

impl Eq for OpenContract {}

impl std::hash::Hash for OpenContract {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.shape.hash(state);
        self.arity.hash(state);
    }
}

impl OpenContract {
    /// Define an open contract.
    pub const fn new(shape: &'static str, arity: usize, cardinality: Cardinality) -> Self {
        Self {
            shape,
            arity,
            cardinality,
        }
    }

    /// The contract's shape name.
    pub fn shape(&self) -> &'static str {
        self.shape
    }

    /// Number of type parameters required to close the contract.
    pub fn arity(&self) -> usize {
        self.arity
    }

    /// Binding cardinality for implementations of this contract.
    pub fn cardinality(&self) -> Cardinality {
        self.cardinality
    }
}

impl fmt::Display for OpenContract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.shape, self.arity)
    }
}

/// A concrete type argument of a closed contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeParam {
    id: TypeId,
    name: &'static str,
}

impl TypeParam {
    /// The parameter for type `T`.
    pub fn of<T: 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// Short type name for diagnostics.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// A closed contract identity: an open contract plus concrete type arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContractId {
    open: OpenContract,
    params: Vec<TypeParam>,
}

impl ContractId {
    /// Close `open` over the given type arguments.
    pub fn close(open: OpenContract, params: Vec<TypeParam>) -> Self {
        debug_assert_eq!(open.arity(), params.len(), "arity mismatch closing {open}");
        Self { open, params }
    }

    /// The open contract this identity closes.
    pub fn open(&self) -> OpenContract {
        self.open
    }

    /// The concrete type arguments.
    pub fn params(&self) -> &[TypeParam] {
        &self.params
    }
}

impl fmt::Display for ContractId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.open.shape())?;
        if !self.params.is_empty() {
            write!(f, "<")?;
            for (i, p) in self.params.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", p.name())?;
            }
            write!(f, ">")?;
        }
        Ok(())
    }
}

/// Identity of a concrete implementation type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImplId {
    id: TypeId,
    name: &'static str,
}

impl ImplId {
    /// The identity of type `T`.
    pub fn of<T: 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// Full type name for diagnostics.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Display for ImplId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Construction lifetime of a registered service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Lifetime {
    /// A fresh instance per resolution.
    Transient,
    /// One instance per scope (one logical operation).
    #[default]
    Scoped,
    /// One instance shared by all operations.
    Singleton,
}

/// One capability registration: a closed contract, its implementation,
/// lifetime, and whether the implementation is itself a decorator.
///
/// Decorator-tagged implementations are never discovered by the scanner as
/// contract implementations; they exist only to wrap discovered ones.
#[derive(Debug, Clone)]
pub struct CapabilityDescriptor {
    pub contract: ContractId,
    pub implementation: ImplId,
    pub lifetime: Lifetime,
    pub decorator: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    const HANDLER: OpenContract = OpenContract::new("CommandHandler", 1, Cardinality::Single);
    const OTHER: OpenContract = OpenContract::new("QueryHandler", 1, Cardinality::Single);

    struct CreateOrder;
    struct CancelOrder;

    #[test]
    fn open_contracts_equal_on_shape_and_arity() {
        assert_eq!(HANDLER, OpenContract::new("CommandHandler", 1, Cardinality::Single));
        assert_ne!(HANDLER, OTHER);
        assert_ne!(HANDLER, OpenContract::new("CommandHandler", 2, Cardinality::Single));
    }

    #[test]
    fn cardinality_does_not_affect_identity() {
        let many = OpenContract::new("CommandHandler", 1, Cardinality::Many);
        assert_eq!(HANDLER, many);
        assert_eq!(
            ContractId::close(HANDLER, vec![TypeParam::of::<CreateOrder>()]),
            ContractId::close(many, vec![TypeParam::of::<CreateOrder>()])
        );
    }

    #[test]
    fn closed_contracts_distinguish_type_arguments() {
        let create = ContractId::close(HANDLER, vec![TypeParam::of::<CreateOrder>()]);
        let cancel = ContractId::close(HANDLER, vec![TypeParam::of::<CancelOrder>()]);
        assert_ne!(create, cancel);
        assert_eq!(
            create,
            ContractId::close(HANDLER, vec![TypeParam::of::<CreateOrder>()])
        );
    }

    #[test]
    fn display_includes_type_arguments() {
        let create = ContractId::close(HANDLER, vec![TypeParam::of::<CreateOrder>()]);
        let rendered = create.to_string();
        assert!(rendered.starts_with("CommandHandler<"));
        assert!(rendered.contains("CreateOrder"));
    }

    #[test]
    fn impl_ids_compare_by_type() {
        assert_eq!(ImplId::of::<CreateOrder>(), ImplId::of::<CreateOrder>());
        assert_ne!(ImplId::of::<CreateOrder>(), ImplId::of::<CancelOrder>());
    }
}
