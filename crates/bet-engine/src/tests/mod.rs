mod process_undo_test;
mod validate_test;
