#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Client messages are normally only serialized, but a permissive parser
    // here catches asymmetries between the two derive paths.
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(msg) = serde_json::from_str::<kotoba_battle_client::protocol::ClientMessage>(s) {
            // Anything that parses must re-serialize and parse back equal.
            let json = serde_json::to_string(&msg).unwrap();
            let reparsed: kotoba_battle_client::protocol::ClientMessage =
                serde_json::from_str(&json).unwrap();
            assert_eq!(reparsed, msg);
        }
    }
});
