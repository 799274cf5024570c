//! Single-image document writer: wrap one JPEG in a one-page PDF 1.4.
//!
//! The file is assembled by hand:
//!
//! ```text
//! %PDF-1.4
//! 1 0 obj  Catalog
//! 2 0 obj  Pages (Kids [3 0 R])
//! 3 0 obj  Page  (MediaBox = scaled image size, XObject /Im0)
//! 4 0 obj  Image XObject, /DCTDecode, raw JPEG bytes
//! 5 0 obj  Content stream painting /Im0 over the whole page
//! xref / trailer / startxref
//! ```
//!
//! Each xref entry is the byte offset of its `N 0 obj` line, taken from the
//! running length of everything written before it. A drift of one byte makes
//! the file unreadable, so offsets are never computed any other way.

use std::fmt::Write as _;

/// A4 portrait at 72 dpi, in PDF user-space units.
pub const PAGE_WIDTH: f64 = 595.0;
pub const PAGE_HEIGHT: f64 = 842.0;

/// Page size for an image of `width × height` pixels: the pixel size scaled
/// down (never up) to fit inside A4, aspect ratio preserved.
pub fn page_size(width: u32, height: u32) -> (f64, f64) {
    let (w, h) = (f64::from(width.max(1)), f64::from(height.max(1)));
    let scale = (PAGE_WIDTH / w).min(PAGE_HEIGHT / h).min(1.0);
    (w * scale, h * scale)
}

/// Builds a PDF from numbered object bodies, tracking offsets as it goes.
struct ObjectWriter {
    buf: Vec<u8>,
    offsets: Vec<usize>,
}

impl ObjectWriter {
    fn new() -> Self {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"%PDF-1.4\n");
        // Binary marker so transfer tools treat the file as binary.
        buf.extend_from_slice(b"%\xE2\xE3\xCF\xD3\n");
        Self {
            buf,
            offsets: Vec::new(),
        }
    }

    /// Append `N 0 obj <dict> endobj` and return its object number.
    fn object(&mut self, dict: &str) -> usize {
        self.begin();
        self.buf.extend_from_slice(dict.as_bytes());
        self.buf.extend_from_slice(b"\nendobj\n");
        self.offsets.len()
    }

    /// Append a stream object; `/Length` is filled in from `data`.
    fn stream(&mut self, dict_entries: &str, data: &[u8]) -> usize {
        self.begin();
        let header = if dict_entries.is_empty() {
            format!("<< /Length {} >>\nstream\n", data.len())
        } else {
            format!("<< {} /Length {} >>\nstream\n", dict_entries, data.len())
        };
        self.buf.extend_from_slice(header.as_bytes());
        self.buf.extend_from_slice(data);
        self.buf.extend_from_slice(b"\nendstream\nendobj\n");
        self.offsets.len()
    }

    fn begin(&mut self) {
        self.offsets.push(self.buf.len());
        let num = self.offsets.len();
        self.buf.extend_from_slice(format!("{num} 0 obj\n").as_bytes());
    }

    fn finish(mut self, root: usize) -> Vec<u8> {
        let xref_offset = self.buf.len();
        let count = self.offsets.len() + 1;
        let mut xref = String::with_capacity(32 + 20 * count);
        let _ = write!(xref, "xref\n0 {count}\n");
        // Entries are exactly 20 bytes: 10-digit offset, space, 5-digit
        // generation, space, type, space, LF.
        xref.push_str("0000000000 65535 f \n");
        for off in &self.offsets {
            let _ = write!(xref, "{off:010} 00000 n \n");
        }
        let _ = write!(
            xref,
            "trailer\n<< /Size {count} /Root {root} 0 R >>\nstartxref\n{xref_offset}\n%%EOF\n"
        );
        self.buf.extend_from_slice(xref.as_bytes());
        self.buf
    }
}

/// Wrap a baseline or progressive RGB JPEG of `width × height` pixels in a
/// one-page PDF whose page is exactly covered by the image.
pub fn single_image_pdf(jpeg: &[u8], width: u32, height: u32) -> Vec<u8> {
    let (page_w, page_h) = page_size(width, height);
    let mut w = ObjectWriter::new();

    let catalog = w.object("<< /Type /Catalog /Pages 2 0 R >>");
    w.object("<< /Type /Pages /Kids [3 0 R] /Count 1 >>");
    w.object(&format!(
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {page_w:.2} {page_h:.2}] \
         /Resources << /XObject << /Im0 4 0 R >> >> /Contents 5 0 R >>"
    ));
    w.stream(
        &format!(
            "/Type /XObject /Subtype /Image /Width {width} /Height {height} \
             /ColorSpace /DeviceRGB /BitsPerComponent 8 /Filter /DCTDecode"
        ),
        jpeg,
    );
    let content = format!("q {page_w:.2} 0 0 {page_h:.2} 0 0 cm /Im0 Do Q");
    w.stream("", content.as_bytes());

    w.finish(catalog)
}
