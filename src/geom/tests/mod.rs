mod test_source_basic;
mod test_tessellation_basic;
