pub(crate) mod empty;
pub(crate) mod empty_root;
pub(crate) mod synthetic;
