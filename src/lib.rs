pub mod decoder;
pub mod definitions;

pub use decoder::Decoder;
pub use definitions::{
    Definitions, Error, Parameter, build_parameters, convert_lookup_table, load_catalog_document,
};
