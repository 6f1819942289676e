pub mod id_map;
pub mod tree_ops;
pub mod updater;
