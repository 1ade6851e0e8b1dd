pub mod employee_cache;
pub mod epc_filter;
