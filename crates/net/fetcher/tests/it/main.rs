#![allow(missing_docs)]

mod admission;
mod import;
mod peers;
pub mod utils;

const fn main() {}
