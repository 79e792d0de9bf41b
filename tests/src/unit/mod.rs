mod chat_tests;
mod refresh_tests;
mod session_tests;
