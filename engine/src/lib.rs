// kargs — Kernel argument derivation
//
// Library root. Given the declared parameters of a generated stencil kernel
// and a caller's partial input, derives every runtime argument the kernel
// needs: dimension sizes from array shapes, halo-adjusted loop bounds, tile
// sizes and declared defaults.

pub mod build;
pub mod check;
pub mod diag;
pub mod engine;
pub mod id;
pub mod lexer;
pub mod param;
pub mod parser;
pub mod provider;
pub mod resolve;
pub mod signature;
pub mod stencil;
pub mod tiling;
pub mod value;

pub use build::runtime_arguments;
pub use diag::ArgError;
pub use engine::{log_arguments, ArgumentEngine, EngineOptions, Invocation};
pub use provider::Provider;
pub use resolve::Reducer;
pub use signature::Signature;
pub use value::Value;
