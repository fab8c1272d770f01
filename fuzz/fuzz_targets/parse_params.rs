#![no_main]

use libfuzzer_sys::fuzz_target;
use mysql_client::ParsedSql;

fuzz_target!(|sql: &str| {
    let _ = ParsedSql::parse(sql);
});
