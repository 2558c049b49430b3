use crate::config::ApConfig;
use crate::traits::{
    ClimateReading, ClimateSensor, ConnectOutcome, NetworkInfo, SensorError, StatusLight, TextDisplay,
    WifiRadio,
};
use crate::Result;
use async_trait::async_trait;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

/// 由独立的外设能力组合而成的网关。
///
/// 例如：真实的 nmcli 无线电 + 模拟的 LED、显示屏和传感器。
#[derive(Clone)]
pub struct Board {
    light: Arc<dyn StatusLight>,
    display: Arc<dyn TextDisplay>,
    sensor: Arc<dyn ClimateSensor>,
    radio: Arc<dyn WifiRadio>,
}

impl Board {
    pub fn new(
        light: Arc<dyn StatusLight>,
        display: Arc<dyn TextDisplay>,
        sensor: Arc<dyn ClimateSensor>,
        radio: Arc<dyn WifiRadio>,
    ) -> Self {
        Self {
            light,
            display,
            sensor,
            radio,
        }
    }
}

#[async_trait]
impl StatusLight for Board {
    async fn set_pixel(&self, red: u8, green: u8, blue: u8) -> Result<()> {
        self.light.set_pixel(red, green, blue).await
    }
}

#[async_trait]
impl TextDisplay for Board {
    async fn show_text(&self, lines: &[String]) -> Result<()> {
        self.display.show_text(lines).await
    }
}

#[async_trait]
impl ClimateSensor for Board {
    async fn read_climate(&self) -> std::result::Result<ClimateReading, SensorError> {
        self.sensor.read_climate().await
    }
}

#[async_trait]
impl WifiRadio for Board {
    async fn start_access_point(&self, ap: &ApConfig) -> Result<IpAddr> {
        self.radio.start_access_point(ap).await
    }

    async fn scan_networks(&self) -> Result<Vec<NetworkInfo>> {
        self.radio.scan_networks().await
    }

    async fn join_network(&self, ssid: &str, password: &str, timeout: Duration) -> ConnectOutcome {
        self.radio.join_network(ssid, password, timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::mock::MockBoard;

    struct FaultySensor;

    #[async_trait]
    impl ClimateSensor for FaultySensor {
        async fn read_climate(&self) -> std::result::Result<ClimateReading, SensorError> {
            Err(SensorError::Unavailable)
        }
    }

    #[tokio::test]
    async fn delegates_each_capability_to_its_part() {
        let mock = Arc::new(MockBoard::new());
        let board = Board::new(mock.clone(), mock.clone(), Arc::new(FaultySensor), mock.clone());

        board.set_pixel(1, 2, 3).await.unwrap();
        assert_eq!(mock.pixel().await, (1, 2, 3));

        board.show_text(&["hi".to_string()]).await.unwrap();
        assert_eq!(mock.display_lines().await, vec!["hi"]);

        assert_eq!(board.read_climate().await, Err(SensorError::Unavailable));
        assert!(mock.read_climate().await.is_ok());

        assert_eq!(board.scan_networks().await.unwrap().len(), 5);
    }
}
