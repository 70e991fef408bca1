//! Entity contract for validated records

/// A record migrated between the base and target stores
///
/// The validator only relies on a stable integer identity and a boolean
/// content comparison. Which fields take part in the comparison is owned
/// entirely by the implementing type: volatile columns such as update
/// timestamps are usually left out.
pub trait Entity: Clone + Send + Sync + 'static {
    /// Stable id, unique within one store
    fn id(&self) -> i64;

    /// Domain-defined content equality between the base and target copies
    fn equals(&self, other: &Self) -> bool;
}
