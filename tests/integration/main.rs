//! Integration tests for the listing harvester

mod crawl_tests;
