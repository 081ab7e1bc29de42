//! HTTP middleware.

pub(crate) mod headers;
pub(crate) mod inject;
