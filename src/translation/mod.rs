mod error;
mod function_rewriter;
mod pipeline;
mod translator;

pub use error::TranslationError;
pub use function_rewriter::{QueryFunctionRewriter, MAX_UNION_DEPTH};
pub use pipeline::{Pipeline, RewritePass};
pub use translator::{translate_offline, Translator};
