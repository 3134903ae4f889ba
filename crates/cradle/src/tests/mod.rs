//! Test suites for the cradle lifecycle core.

pub(crate) mod support;
