#![no_main]

use libfuzzer_sys::fuzz_target;

use newsfold::email::parse_raw_email;
use newsfold::fetcher::parse_feed;
use newsfold::fingerprint::ContentHashes;

fuzz_target!(|data: &[u8]| {
    // Neither parser may panic on hostile input
    if let Ok(feed) = parse_feed(data) {
        for item in &feed.items {
            let _ = ContentHashes::compute(&item.normalized.clean_title, &item.normalized.clean_content);
        }
    }

    if let Ok(email) = parse_raw_email(data) {
        let _ = email.sender();
        let _ = email.raw_body();
    }
});
