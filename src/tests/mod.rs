
mod processor_tests;
mod session_tests;
