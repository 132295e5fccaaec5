//! Single-page PDF invoice writer.
//!
//! Produces a PDF 1.4 file with one page, the standard Helvetica fonts, and
//! an uncompressed content stream. Only printable ASCII is emitted; other
//! characters are replaced with `?`.

use std::fmt::Write as _;

use bytes::Bytes;

use suncube_core::error::AppError;
use suncube_core::result::AppResult;

use super::{DocumentRenderer, InvoiceDocument};

/// US Letter in points.
const PAGE_WIDTH: u32 = 612;
const PAGE_HEIGHT: u32 = 792;
const MARGIN: u32 = 72;

/// Renders invoices as PDF documents.
#[derive(Debug, Clone, Default)]
pub struct PdfInvoiceRenderer {
    /// Issuer name printed in the header.
    issuer: String,
}

impl PdfInvoiceRenderer {
    /// Create a renderer printing `issuer` in the header.
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
        }
    }

    fn content_stream(&self, invoice: &InvoiceDocument) -> Result<String, std::fmt::Error> {
        let mut s = String::new();
        let mut y = PAGE_HEIGHT - MARGIN;

        writeln!(s, "BT /F2 22 Tf {MARGIN} {y} Td ({}) Tj ET", escape("INVOICE"))?;
        if !self.issuer.is_empty() {
            let x = PAGE_WIDTH - MARGIN - 180;
            writeln!(s, "BT /F1 11 Tf {x} {y} Td ({}) Tj ET", escape(&self.issuer))?;
        }
        y -= 40;

        let rows = [
            ("Invoice number", invoice.number.clone()),
            ("Issue date", invoice.issued_at.format("%Y-%m-%d").to_string()),
            ("Customer", invoice.customer_id.to_string()),
            ("Payment", invoice.payment_id.to_string()),
            ("Status", invoice.status.clone()),
        ];
        for (label, value) in rows {
            writeln!(s, "BT /F2 10 Tf {MARGIN} {y} Td ({}) Tj ET", escape(label))?;
            writeln!(s, "BT /F1 10 Tf {} {y} Td ({}) Tj ET", MARGIN + 110, escape(&value))?;
            y -= 16;
        }

        y -= 24;
        writeln!(s, "{MARGIN} {y} m {} {y} l S", PAGE_WIDTH - MARGIN)?;
        y -= 20;
        writeln!(s, "BT /F2 11 Tf {MARGIN} {y} Td (Description) Tj ET")?;
        writeln!(s, "BT /F2 11 Tf {} {y} Td (Amount) Tj ET", PAGE_WIDTH - MARGIN - 120)?;
        y -= 18;
        writeln!(
            s,
            "BT /F1 11 Tf {MARGIN} {y} Td ({}) Tj ET",
            escape(&truncate(&invoice.description, 60))
        )?;
        writeln!(
            s,
            "BT /F1 11 Tf {} {y} Td ({}) Tj ET",
            PAGE_WIDTH - MARGIN - 120,
            escape(&format!("{} {}", invoice.amount, invoice.currency))
        )?;
        y -= 14;
        writeln!(s, "{MARGIN} {y} m {} {y} l S", PAGE_WIDTH - MARGIN)?;
        y -= 22;
        writeln!(
            s,
            "BT /F2 12 Tf {} {y} Td ({}) Tj ET",
            PAGE_WIDTH - MARGIN - 180,
            escape(&format!("Total: {} {}", invoice.amount, invoice.currency))
        )?;

        Ok(s)
    }
}

impl DocumentRenderer for PdfInvoiceRenderer {
    fn content_type(&self) -> &'static str {
        "application/pdf"
    }

    fn file_extension(&self) -> &'static str {
        "pdf"
    }

    fn render(&self, invoice: &InvoiceDocument) -> AppResult<Bytes> {
        let content = self
            .content_stream(invoice)
            .map_err(|e| AppError::render(format!("Failed to lay out invoice: {e}")))?;

        let objects = [
            "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
            "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
            format!(
                "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {PAGE_WIDTH} {PAGE_HEIGHT}] \
                 /Resources << /Font << /F1 4 0 R /F2 5 0 R >> >> /Contents 6 0 R >>"
            ),
            "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
            "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica-Bold >>".to_string(),
            format!(
                "<< /Length {} >>\nstream\n{content}endstream",
                content.len()
            ),
        ];

        let mut out = String::from("%PDF-1.4\n");
        let mut offsets = Vec::with_capacity(objects.len());
        for (i, body) in objects.iter().enumerate() {
            offsets.push(out.len());
            out.push_str(&format!("{} 0 obj\n{body}\nendobj\n", i + 1));
        }

        let xref_offset = out.len();
        out.push_str(&format!("xref\n0 {}\n", objects.len() + 1));
        out.push_str("0000000000 65535 f \n");
        for offset in offsets {
            out.push_str(&format!("{offset:010} 00000 n \n"));
        }
        out.push_str(&format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref_offset}\n%%EOF\n",
            objects.len() + 1
        ));

        Ok(Bytes::from(out))
    }
}

/// Escape text for a PDF literal string.
fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '(' | ')' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            ' '..='~' => out.push(c),
            _ => out.push('?'),
        }
    }
    out
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut s: String = text.chars().take(max_chars - 3).collect();
    s.push_str("...");
    s
}
