//! Command-level tests

mod test_chat;
mod test_export;
