use std::thread;

use anyhow::{Context, Result, anyhow};
use embedded_svc::http::Status;
use embedded_svc::http::client::Client;
use embedded_svc::io::Write;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::hal::modem::Modem;
use esp_idf_svc::http::client::{Configuration as HttpConfiguration, EspHttpConnection};
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::wifi::{AuthMethod, BlockingWifi, ClientConfiguration, Configuration, EspWifi};
use log::{info, warn};

use crate::config::{HTTP_TIMEOUT, ServerConfig, WIFI_CONNECT_ATTEMPTS, WIFI_RETRY_DELAY};
use crate::control::Link;
use crate::models::Reading;
use crate::provisioning::{self, Credentials};
use crate::report::{self, PayloadFormat, ReportSink};

/// Owns the WiFi stack and acts as the loop's connectivity gate.
pub struct WifiSupervisor {
    wifi: BlockingWifi<EspWifi<'static>>,
}

/// Brings WiFi up with stored (or build-baked) credentials. When no
/// credentials exist or every attempt fails, hands over to the provisioning
/// portal, which always ends in a device restart; this either returns a
/// connected supervisor or never returns at all.
pub fn establish(
    modem: Modem,
    sys_loop: EspSystemEventLoop,
    nvs: EspDefaultNvsPartition,
) -> Result<WifiSupervisor> {
    let esp_wifi = EspWifi::new(modem, sys_loop.clone(), Some(nvs.clone()))?;
    let mut wifi = BlockingWifi::wrap(esp_wifi, sys_loop)?;

    let Some(credentials) = provisioning::stored_credentials(&nvs).or_else(Credentials::baked)
    else {
        warn!("📶 No WiFi credentials stored; starting provisioning portal");
        provisioning::run_portal(&mut wifi, nvs);
    };

    match connect_station(&mut wifi, &credentials) {
        Ok(()) => Ok(WifiSupervisor { wifi }),
        Err(e) => {
            warn!("📶 {e:#}; starting provisioning portal");
            let _ = wifi.disconnect();
            let _ = wifi.stop();
            provisioning::run_portal(&mut wifi, nvs);
        }
    }
}

fn connect_station(
    wifi: &mut BlockingWifi<EspWifi<'static>>,
    credentials: &Credentials,
) -> Result<()> {
    wifi.set_configuration(&Configuration::Client(ClientConfiguration {
        ssid: credentials
            .ssid
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("SSID is too long"))?,
        password: credentials
            .pass
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("Password is too long"))?,
        auth_method: AuthMethod::WPA2Personal,
        ..Default::default()
    }))?;
    wifi.start()?;
    info!("📶 WiFi starting, connecting to `{}`...", credentials.ssid);

    for attempt in 1..=WIFI_CONNECT_ATTEMPTS {
        info!("📶 WiFi connecting (attempt {attempt}/{WIFI_CONNECT_ATTEMPTS})...");
        match wifi.connect().and_then(|()| wifi.wait_netif_up()) {
            Ok(()) => {
                let ip_info = wifi.wifi().sta_netif().get_ip_info()?;
                info!("✅ WiFi Connected | IP: {}", ip_info.ip);
                return Ok(());
            }
            Err(e) => warn!("📶 Connect attempt {attempt} failed: {e:?}"),
        }

        if attempt < WIFI_CONNECT_ATTEMPTS {
            let _ = wifi.disconnect();
            thread::sleep(WIFI_RETRY_DELAY);
        }
    }

    Err(anyhow!(
        "Failed to connect after {WIFI_CONNECT_ATTEMPTS} attempts"
    ))
}

impl Link for WifiSupervisor {
    fn is_connected(&mut self) -> bool {
        self.wifi.is_connected().unwrap_or(false)
    }

    fn request_reconnect(&mut self) {
        // Fire-and-forget: kick the driver and let the next iteration
        // re-check the gate.
        if let Err(e) = self.wifi.wifi_mut().connect() {
            warn!("📶 Reconnect request failed: {e:?}");
        }
    }
}

/// Blocking HTTP delivery of one reading per iteration, in the profile's
/// wire format. At-most-once: any failure is surfaced to the caller for
/// logging and the value is dropped.
pub struct HttpReporter {
    client: Client<EspHttpConnection>,
    base_url: String,
    device_id: &'static str,
    format: PayloadFormat,
}

impl HttpReporter {
    pub fn new(
        server: &ServerConfig,
        device_id: &'static str,
        format: PayloadFormat,
    ) -> Result<Self> {
        let connection = EspHttpConnection::new(&HttpConfiguration {
            timeout: Some(HTTP_TIMEOUT),
            ..Default::default()
        })
        .context("Failed to init HTTP client")?;

        Ok(Self {
            client: Client::wrap(connection),
            base_url: server.base_url(),
            device_id,
            format,
        })
    }
}

impl ReportSink for HttpReporter {
    fn send(&mut self, reading: &Reading) -> Result<u16> {
        let status = match self.format {
            PayloadFormat::JsonBody => {
                let payload = report::json_body(self.device_id, reading);
                let headers = [("Content-Type", "application/json")];
                let mut request = self.client.post(&self.base_url, &headers)?;
                request.write_all(payload.as_bytes())?;
                request.submit()?.status()
            }
            PayloadFormat::QueryString => {
                let url = format!(
                    "{}{}",
                    self.base_url,
                    report::query_string(self.device_id, reading)
                );
                self.client.get(&url)?.submit()?.status()
            }
        };
        Ok(status)
    }
}
