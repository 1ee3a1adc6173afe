//! QR rendering of authentication challenges.
//!
//! The driver hands us the raw challenge token; dashboards need something a
//! phone camera can scan.  The token is rendered as an SVG QR code and
//! wrapped in a base64 `data:` URL so it can be dropped straight into an
//! `<img src>`.  For operators watching the log, the same token can be
//! drawn with unicode half blocks.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use qrcode::render::{svg, unicode};
use qrcode::QrCode;

use crate::application::ports::{ChallengeEncodeError, ChallengeEncoder};

const DATA_URL_PREFIX: &str = "data:image/svg+xml;base64,";

/// Renders challenges as SVG QR codes.
#[derive(Debug, Clone, Copy)]
pub struct QrChallengeEncoder {
    /// Minimum rendered edge length, in pixels.
    pub min_size: u32,
}

impl Default for QrChallengeEncoder {
    fn default() -> Self {
        Self { min_size: 256 }
    }
}

impl ChallengeEncoder for QrChallengeEncoder {
    fn encode(&self, token: &str) -> Result<String, ChallengeEncodeError> {
        let code = QrCode::new(token.as_bytes()).map_err(|e| ChallengeEncodeError(e.to_string()))?;
        let image = code
            .render::<svg::Color<'_>>()
            .min_dimensions(self.min_size, self.min_size)
            .build();
        Ok(format!("{DATA_URL_PREFIX}{}", STANDARD.encode(image)))
    }

    fn terminal(&self, token: &str) -> Option<String> {
        let code = QrCode::new(token.as_bytes()).ok()?;
        Some(
            code.render::<unicode::Dense1x2>()
                .dark_color(unicode::Dense1x2::Light)
                .light_color(unicode::Dense1x2::Dark)
                .build(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encodes_token_as_svg_data_url() {
        // Arrange
        let encoder = QrChallengeEncoder::default();

        // Act
        let url = encoder.encode("2@Zm9vYmFy,abc,def==").unwrap();

        // Assert
        let payload = url.strip_prefix(DATA_URL_PREFIX).expect("svg data url");
        let svg = String::from_utf8(STANDARD.decode(payload).unwrap()).unwrap();
        assert!(svg.contains("<svg"));
    }

    #[test]
    fn test_same_token_renders_identically() {
        let encoder = QrChallengeEncoder::default();
        assert_eq!(encoder.encode("token").unwrap(), encoder.encode("token").unwrap());
    }

    #[test]
    fn test_terminal_rendering_uses_half_blocks() {
        // Arrange
        let encoder = QrChallengeEncoder::default();

        // Act
        let text = encoder.terminal("2@Zm9vYmFy,abc,def==").unwrap();

        // Assert
        assert!(text.lines().count() > 10);
        assert!(text.chars().any(|c| matches!(c, '█' | '▀' | '▄')));
    }

    #[test]
    fn test_terminal_rendering_of_oversized_token_is_none() {
        let token = "x".repeat(8 * 1024);
        assert!(QrChallengeEncoder::default().terminal(&token).is_none());
    }

    #[test]
    fn test_oversized_token_is_an_error() {
        // A version-40 QR code holds under 3 KB.
        let token = "x".repeat(8 * 1024);
        assert!(QrChallengeEncoder::default().encode(&token).is_err());
    }
}
