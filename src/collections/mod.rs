mod ordered;

pub use ordered::OrderedSet;
