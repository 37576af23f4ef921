use anyhow::Context;
use drive_core::*;
use nmea0183::{ParseResult, Parser};
use tokio::net::UdpSocket;
use tracing::{debug, info};

pub const MPH_PER_KNOT: f64 = 1.15078;

#[derive(Clone, Debug)]
pub struct NmeaConfig {
    pub bind_addr: String, // e.g. "0.0.0.0:10110"
}

impl Default for NmeaConfig {
    fn default() -> Self {
        Self { bind_addr: "0.0.0.0:10110".into() }
    }
}

/// Turns a byte stream of NMEA 0183 sentences into fixes. Only RMC carries
/// both position and speed, so every other sentence type is skipped. RMC
/// with a void (`V`) status is rejected.
///
/// Sentences may be split across calls to [`RmcDecoder::feed`]; the parser
/// keeps the partial line.
pub struct RmcDecoder {
    parser: Parser,
}

impl Default for RmcDecoder {
    fn default() -> Self {
        Self { parser: Parser::new() }
    }
}

impl RmcDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fixes completed by `bytes`, plus the reasons rejected sentences failed
    /// (bad checksum, malformed fields).
    pub fn feed(&mut self, bytes: &[u8]) -> (Vec<LocationFix>, Vec<&'static str>) {
        let mut fixes = Vec::new();
        let mut rejected = Vec::new();
        for result in self.parser.parse_from_bytes(bytes) {
            match result {
                Ok(ParseResult::RMC(Some(rmc))) => {
                    // status `V` still parses when the position fields are filled in
                    if !rmc.mode.is_valid() {
                        rejected.push("void fix");
                        continue;
                    }
                    let point = GeoPoint::new(rmc.latitude.as_f64(), rmc.longitude.as_f64());
                    if !point.is_valid() {
                        rejected.push("position out of range");
                        continue;
                    }
                    let speed_mph = rmc.speed.as_knots() as f64 * MPH_PER_KNOT;
                    fixes.push(LocationFix::now(point, speed_mph));
                }
                Ok(_) => {}
                Err(e) => rejected.push(e),
            }
        }
        (fixes, rejected)
    }
}

/// GPS receiver forwarding NMEA 0183 over UDP, any number of sentences per
/// datagram.
pub struct NmeaUdpSource {
    cfg: NmeaConfig,
}

impl NmeaUdpSource {
    pub fn new(cfg: NmeaConfig) -> Self {
        Self { cfg }
    }
}

#[async_trait::async_trait]
impl LocationSource for NmeaUdpSource {
    async fn run(&self, tx: LocationTx) -> Result<(), SourceError> {
        let socket = UdpSocket::bind(&self.cfg.bind_addr)
            .await
            .with_context(|| format!("bind {}", self.cfg.bind_addr))?;
        info!(addr = %self.cfg.bind_addr, "listening for NMEA");
        let mut decoder = RmcDecoder::new();
        let mut buf = vec![0u8; 4096];
        loop {
            let (len, peer) = socket.recv_from(&mut buf).await?;
            let (fixes, rejected) = decoder.feed(&buf[..len]);
            for reason in rejected {
                debug!(%peer, reason, "NMEA sentence rejected");
            }
            for fix in fixes {
                if tx.send(fix).is_err() {
                    // receiver gone
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RMC: &str = "$GPRMC,123519.00,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W,A*29\r\n";

    #[test]
    fn test_valid_rmc() {
        let (fixes, rejected) = RmcDecoder::new().feed(RMC.as_bytes());
        assert!(rejected.is_empty());
        assert_eq!(fixes.len(), 1);
        let fix = fixes[0];
        assert!((fix.point.latitude - 48.1173).abs() < 1e-3);
        assert!((fix.point.longitude - 11.516_666).abs() < 1e-3);
        assert!((fix.speed_mph - 22.4 * MPH_PER_KNOT).abs() < 1e-3);
    }

    #[test]
    fn test_southern_western_hemispheres() {
        let s = "$GNRMC,000000.00,A,3351.000,S,15112.000,W,000.0,000.0,010124,,,A*4B\r\n";
        let (fixes, _) = RmcDecoder::new().feed(s.as_bytes());
        assert_eq!(fixes.len(), 1);
        assert!((fixes[0].point.latitude + 33.85).abs() < 1e-3);
        assert!((fixes[0].point.longitude + 151.2).abs() < 1e-3);
        assert_eq!(fixes[0].speed_mph, 0.0);
    }

    #[test]
    fn test_void_fix_is_skipped() {
        let s = "$GPRMC,123519.00,V,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W,N*31\r\n";
        let (fixes, rejected) = RmcDecoder::new().feed(s.as_bytes());
        assert!(fixes.is_empty());
        assert_eq!(rejected, vec!["void fix"]);
    }

    #[test]
    fn test_void_between_valid_fixes() {
        let void = "$GPRMC,123519.00,V,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W,N*31\r\n";
        let stream = format!("{RMC}{void}{RMC}");
        let (fixes, rejected) = RmcDecoder::new().feed(stream.as_bytes());
        assert_eq!(fixes.len(), 2);
        assert_eq!(rejected, vec!["void fix"]);
    }

    #[test]
    fn test_checksum_mismatch_is_rejected() {
        let bad = RMC.replace("*29", "*00");
        let (fixes, rejected) = RmcDecoder::new().feed(bad.as_bytes());
        assert!(fixes.is_empty());
        assert_eq!(rejected.len(), 1);
    }

    #[test]
    fn test_other_sentences_ignored() {
        let gga = "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47\r\n";
        let (fixes, rejected) = RmcDecoder::new().feed(gga.as_bytes());
        assert!(fixes.is_empty());
        assert!(rejected.is_empty());
    }

    #[test]
    fn test_sentence_split_across_datagrams() {
        let mut d = RmcDecoder::new();
        let (head, tail) = RMC.split_at(30);
        assert!(d.feed(head.as_bytes()).0.is_empty());
        assert_eq!(d.feed(tail.as_bytes()).0.len(), 1);
    }

    #[tokio::test]
    async fn test_udp_source_forwards_fixes() {
        let scratch = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        let addr = scratch.local_addr().unwrap();
        drop(scratch);

        let src = NmeaUdpSource::new(NmeaConfig { bind_addr: addr.to_string() });
        let (tx, mut rx) = channel();
        let task = tokio::spawn(async move { src.run(tx).await });

        let sender = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let fix = loop {
            sender.send_to(RMC.as_bytes(), addr).await.unwrap();
            match tokio::time::timeout(std::time::Duration::from_millis(50), rx.recv()).await {
                Ok(Some(fix)) => break fix,
                _ => continue,
            }
        };
        assert!((fix.point.latitude - 48.1173).abs() < 1e-3);
        task.abort();
    }
}
