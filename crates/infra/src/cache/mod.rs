pub mod stock_cache;
