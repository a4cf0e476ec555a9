#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(status) = serde_json::from_slice::<automedon::vehicle::VehicleStatus>(data) {
        let _ = status.shows_activity();
        let _ = status.range();
        if let Some(code) = status.air_temp.as_deref()
            && let Some(celsius) = automedon::units::decode_temperature(code)
        {
            let _ = automedon::units::encode_temperature(celsius);
        }
    }
    if let Ok(text) = std::str::from_utf8(data) {
        let _ = automedon::units::decode_temperature(text);
    }
});
