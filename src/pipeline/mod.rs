pub mod charts;
pub mod features;
pub mod knowledge;
pub mod model;
pub mod narrative;
pub mod report;
pub mod safety;
pub mod scoring;
pub mod training;
