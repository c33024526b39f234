//! HTTP handlers for resources, tracking, actions, schema exposure and site content.

pub mod action;
pub mod entity;
pub mod model;
pub mod site;
pub mod track;
