use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result, anyhow};
use embedded_svc::http::{Headers, Method};
use esp_idf_svc::hal::delay::FreeRtos;
use esp_idf_svc::hal::reset;
use esp_idf_svc::http::server::{Configuration as HttpServerConfiguration, EspHttpServer, Request};
use esp_idf_svc::io::{Read, Write};
use esp_idf_svc::nvs::{EspDefaultNvsPartition, EspNvs};
use esp_idf_svc::wifi::{AccessPointConfiguration, AuthMethod, BlockingWifi, Configuration, EspWifi};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::config::{
    PROVISIONING_AP_PASS, PROVISIONING_AP_SSID, PROVISIONING_PORTAL_TIMEOUT, RESTART_GRACE,
};

const NVS_NAMESPACE: &str = "vitaltrack";
const KEY_SSID: &str = "wifi_ssid";
const KEY_PASS: &str = "wifi_pass";
const MAX_HTTP_BODY: usize = 512;

const PORTAL_HTML: &str = r#"<!doctype html>
<html lang="en">
<head><meta charset="utf-8"><title>VitalTrack Setup</title></head>
<body>
  <h1>VitalTrack Setup</h1>
  <p>Enter the WiFi network this device should join. It restarts after saving.</p>
  <label>SSID <input id="ssid" type="text"></label><br>
  <label>Password <input id="pass" type="password"></label><br>
  <button id="save">Save</button>
  <p id="status"></p>
  <script>
    document.getElementById('save').addEventListener('click', async () => {
      const body = JSON.stringify({
        ssid: document.getElementById('ssid').value.trim(),
        pass: document.getElementById('pass').value,
      });
      const r = await fetch('/api/credentials', { method: 'POST', body });
      document.getElementById('status').textContent =
        r.ok ? 'Saved. Device is restarting.' : 'Save failed: ' + r.status;
    });
  </script>
</body>
</html>
"#;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Credentials {
    pub ssid: String,
    pub pass: String,
}

impl Credentials {
    /// Build-baked fallback used when nothing is stored yet.
    pub fn baked() -> Option<Self> {
        let ssid = option_env!("VITALTRACK_WIFI_SSID")?;
        let pass = option_env!("VITALTRACK_WIFI_PASS").unwrap_or("");
        Some(Self {
            ssid: ssid.to_string(),
            pass: pass.to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct CredentialsUpdate {
    ssid: String,
    #[serde(default)]
    pass: String,
}

#[derive(Debug, Serialize)]
struct NetworkView {
    ssid: String,
    pass_set: bool,
}

pub fn stored_credentials(partition: &EspDefaultNvsPartition) -> Option<Credentials> {
    let nvs = EspNvs::new(partition.clone(), NVS_NAMESPACE, false).ok()?;

    let mut ssid_buf = [0u8; 33];
    let mut pass_buf = [0u8; 65];
    let ssid = nvs.get_str(KEY_SSID, &mut ssid_buf).ok()??.to_string();
    let pass = nvs
        .get_str(KEY_PASS, &mut pass_buf)
        .ok()
        .flatten()
        .unwrap_or_default()
        .to_string();

    if ssid.is_empty() {
        return None;
    }
    Some(Credentials { ssid, pass })
}

fn store_credentials(
    partition: &EspDefaultNvsPartition,
    credentials: &Credentials,
) -> Result<()> {
    let mut nvs = EspNvs::new(partition.clone(), NVS_NAMESPACE, true)
        .context("Failed to open NVS namespace")?;
    nvs.set_str(KEY_SSID, &credentials.ssid)?;
    nvs.set_str(KEY_PASS, &credentials.pass)?;
    Ok(())
}

/// Terminal provisioning path: exposes the configuration access point plus a
/// minimal portal, then restarts the device, whether credentials arrived or
/// the portal timed out. Never returns.
pub fn run_portal(wifi: &mut BlockingWifi<EspWifi<'static>>, nvs: EspDefaultNvsPartition) -> ! {
    let saved = Arc::new(AtomicBool::new(false));

    let outcome = start_access_point(wifi)
        .and_then(|()| portal_server(nvs, saved.clone()))
        .map(|server| wait_for_credentials(&saved, server));

    match outcome {
        Ok(true) => info!("📶 Credentials saved; restarting to join the network..."),
        Ok(false) => warn!("❌ Provisioning portal timed out. Restarting..."),
        Err(e) => warn!("❌ Provisioning portal failed ({e:#}). Restarting..."),
    }

    FreeRtos::delay_ms(RESTART_GRACE.as_millis() as u32);
    reset::restart()
}

fn start_access_point(wifi: &mut BlockingWifi<EspWifi<'static>>) -> Result<()> {
    wifi.set_configuration(&Configuration::AccessPoint(AccessPointConfiguration {
        ssid: PROVISIONING_AP_SSID
            .try_into()
            .map_err(|_| anyhow!("AP SSID is too long"))?,
        password: PROVISIONING_AP_PASS
            .try_into()
            .map_err(|_| anyhow!("AP password is too long"))?,
        auth_method: AuthMethod::WPA2Personal,
        ..Default::default()
    }))?;
    wifi.start()?;
    wifi.wait_netif_up()?;
    info!(
        "📡 Provisioning AP `{}` up; connect and open http://192.168.71.1/",
        PROVISIONING_AP_SSID
    );
    Ok(())
}

fn portal_server(
    nvs: EspDefaultNvsPartition,
    saved: Arc<AtomicBool>,
) -> Result<EspHttpServer<'static>> {
    let mut server = EspHttpServer::new(&HttpServerConfiguration::default())?;

    server.fn_handler::<anyhow::Error, _>("/", Method::Get, |req| {
        req.into_ok_response()?.write_all(PORTAL_HTML.as_bytes())?;
        Ok(())
    })?;

    {
        let nvs = nvs.clone();
        server.fn_handler::<anyhow::Error, _>("/api/network", Method::Get, move |req| {
            let view = match stored_credentials(&nvs) {
                Some(credentials) => NetworkView {
                    ssid: credentials.ssid,
                    pass_set: !credentials.pass.is_empty(),
                },
                None => NetworkView {
                    ssid: String::new(),
                    pass_set: false,
                },
            };
            let body = serde_json::to_vec(&view)?;
            req.into_ok_response()?.write_all(&body)?;
            Ok(())
        })?;
    }

    server.fn_handler::<anyhow::Error, _>("/api/credentials", Method::Post, move |mut req| {
        let body = read_request_body(&mut req)?;
        let update: CredentialsUpdate =
            serde_json::from_slice(&body).context("invalid credentials payload")?;

        if update.ssid.trim().is_empty() {
            req.into_status_response(400)?
                .write_all(br#"{"error": "ssid must not be empty"}"#)?;
            return Ok(());
        }

        store_credentials(
            &nvs,
            &Credentials {
                ssid: update.ssid,
                pass: update.pass,
            },
        )?;
        saved.store(true, Ordering::Relaxed);

        req.into_ok_response()?
            .write_all(br#"{"saved": true, "restarting": true}"#)?;
        Ok(())
    })?;

    Ok(server)
}

/// Holds the server alive until credentials arrive or the portal times out.
/// Returns whether credentials were saved.
fn wait_for_credentials(saved: &AtomicBool, server: EspHttpServer<'static>) -> bool {
    let _server = server;
    for _ in 0..PROVISIONING_PORTAL_TIMEOUT.as_secs() {
        if saved.load(Ordering::Relaxed) {
            // Give the in-flight HTTP response a moment to flush.
            FreeRtos::delay_ms(1_000);
            return true;
        }
        FreeRtos::delay_ms(1_000);
    }
    false
}

fn read_request_body(
    req: &mut Request<&mut esp_idf_svc::http::server::EspHttpConnection<'_>>,
) -> Result<Vec<u8>> {
    let len = req.content_len().unwrap_or(0) as usize;
    if len > MAX_HTTP_BODY {
        return Err(anyhow!("request body too large"));
    }

    let mut body = vec![0_u8; len];
    if len > 0 {
        req.read_exact(&mut body)?;
    }
    Ok(body)
}
