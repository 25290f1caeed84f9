//! Entity trait: objects that live inside an aggregate and keep their identity
//! while their attributes change (e.g. a vendor's staff member).

pub trait Entity {
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    fn id(&self) -> &Self::Id;
}
