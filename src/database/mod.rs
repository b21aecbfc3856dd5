mod conninfo;

pub use conninfo::ConnectionParams;
