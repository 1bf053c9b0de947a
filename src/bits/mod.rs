pub mod reader;
pub use reader::{
    read_u16, read_u16_le, read_u24, read_u32, read_u32_le, read_u64, read_u64_le, read_u8,
    read_var_le,
};
