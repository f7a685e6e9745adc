mod db_tests;
mod helpers;
mod recovery_tests;
