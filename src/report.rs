use crate::models::Reading;

/// Wire encoding of a reported reading. The exact byte layout is part of the
/// server contract, including decimal places and separator spacing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PayloadFormat {
    /// `POST` with a JSON body, values at two decimals.
    JsonBody,
    /// `GET` with the reading in the query string, values at one decimal.
    QueryString,
}

/// JSON body for the POST variant. Built by hand: the contract pins trailing
/// zeros ("36.50") and separator bytes that `serde_json` float rendering
/// would not reproduce.
pub fn json_body(device_id: &str, reading: &Reading) -> String {
    format!(
        "{{\"temperature\": {:.2},\"humidity\": {:.2},\"device\": \"{}\"}}",
        reading.temperature, reading.humidity, device_id
    )
}

/// Query-string suffix for the GET variant, appended to the base URL.
pub fn query_string(device_id: &str, reading: &Reading) -> String {
    format!(
        "?device={}&temp={:.1}&humidity={:.1}",
        device_id, reading.temperature, reading.humidity
    )
}

/// Delivery outcome of one report attempt. Anything that is not a transport
/// failure carries the server's status code; the caller only logs it, and
/// the value is discarded either way (at-most-once, no retry).
pub trait ReportSink {
    fn send(&mut self, reading: &Reading) -> anyhow::Result<u16>;
}
