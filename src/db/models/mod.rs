pub mod walk;

pub use walk::WalkRecord;
