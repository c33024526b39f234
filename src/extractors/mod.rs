//! Request extractors.

mod site;
