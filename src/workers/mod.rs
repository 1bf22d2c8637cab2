pub mod ladder;
pub mod transcoder;
