pub mod aggregator;
pub mod bus;
