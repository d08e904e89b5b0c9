pub mod rest;

pub use rest::{paginate_backward, BinanceKlineSource, RetryPolicy};
