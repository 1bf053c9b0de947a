pub mod fourcc;
pub use fourcc::FourCC;
pub mod data;
pub use data::BoxData;
pub mod tree;
pub use tree::{BoxArena, BoxNode, BoxSummary, NodeId};
pub mod header;
pub use header::{peek_box_header, BoxHeader};
pub mod builder;
pub use builder::{build_child_of_type, build_children, read_root, BuildStatus};
pub mod leaves;
pub mod sample_entries;
pub mod cmov;
pub mod fragindex;
pub use fragindex::FragmentIndex;
