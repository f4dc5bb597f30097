//! Document encoding: raw PDF bytes → base64 inline attachment.
//!
//! Gemini reads PDFs natively, so the whole file goes to the model as one
//! `application/pdf` inline part; there is no page rasterisation step.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use tracing::debug;

pub const PDF_MIME_TYPE: &str = "application/pdf";

/// Wrap a PDF as an inline attachment for a multimodal chat message.
pub fn encode_pdf(bytes: &[u8]) -> ImageData {
    let b64 = STANDARD.encode(bytes);
    debug!("Encoded PDF → {} bytes base64", b64.len());
    ImageData::new(b64, PDF_MIME_TYPE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_as_inline_pdf() {
        let data = encode_pdf(b"%PDF-1.4 minimal");
        assert_eq!(data.mime_type, "application/pdf");
        let decoded = STANDARD.decode(&data.data).unwrap();
        assert_eq!(decoded, b"%PDF-1.4 minimal");
    }
}
