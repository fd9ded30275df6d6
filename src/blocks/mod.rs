// src/blocks/mod.rs
pub mod common;
pub mod identification_block;
pub mod header_block;
pub mod group_block;
pub mod input_block;
pub mod block_info_block;
pub mod attribute_block;
pub mod data_block;
pub mod data_list_block;
pub mod envelope_block;
