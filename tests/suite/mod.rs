//! Integration test suite modules

mod attenuation;
mod bootstrap;
mod names;
mod provisioning;
mod space;
