mod change_tests;
mod common;
mod target_tests;
