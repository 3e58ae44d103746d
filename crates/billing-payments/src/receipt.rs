//! Receipt Rendering
//!
//! CSV and PDF projections of an issued `Receipt`. Nothing here changes
//! state; ownership is checked by the caller before rendering.

use std::fmt::Write as _;

use billing_core::Receipt;

use crate::error::{PaymentError, Result};

const CSV_HEADER: [&str; 11] = [
    "receiptNumber",
    "issuedAt",
    "amount",
    "currency",
    "months",
    "unitPrice",
    "discountPercent",
    "network",
    "msisdn",
    "provider",
    "providerRef",
];

/// `receipt-<number>.<ext>`
pub fn file_name(receipt: &Receipt, extension: &str) -> String {
    format!("receipt-{}.{extension}", receipt.receipt_number)
}

/// Header row plus one data row
pub fn render_csv(receipt: &Receipt) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(CSV_HEADER)
        .map_err(|e| PaymentError::Render(e.to_string()))?;
    writer
        .write_record([
            receipt.receipt_number.clone(),
            receipt.issued_at.to_rfc3339(),
            receipt.amount.to_string(),
            receipt.currency.clone(),
            receipt.months.to_string(),
            receipt.unit_price.to_string(),
            receipt.discount_percent.to_string(),
            receipt.network.map(|n| n.as_str().to_string()).unwrap_or_default(),
            receipt.msisdn.clone(),
            receipt.provider.as_str().to_string(),
            receipt.provider_ref.clone().unwrap_or_default(),
        ])
        .map_err(|e| PaymentError::Render(e.to_string()))?;

    let bytes = writer
        .into_inner()
        .map_err(|e| PaymentError::Render(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| PaymentError::Render(e.to_string()))
}

/// Text lines printed on the PDF, title first
fn pdf_lines(receipt: &Receipt) -> Vec<String> {
    let mut lines = vec![
        "Trivida Premium Receipt".to_string(),
        format!("Receipt number: {}", receipt.receipt_number),
        format!("Date: {}", receipt.issued_at.format("%Y-%m-%d %H:%M UTC")),
        format!("Amount: {} {}", receipt.amount, receipt.currency),
        format!("Duration: {} month(s) at {} {}/month", receipt.months, receipt.unit_price, receipt.currency),
    ];
    if receipt.discount_percent > 0 {
        lines.push(format!("Discount: {}%", receipt.discount_percent));
    }
    lines.push(format!(
        "Network: {}",
        receipt.network.map_or("-", |n| n.as_str())
    ));
    lines.push(format!("Phone: {}", receipt.msisdn));
    lines.push(format!("Provider: {}", receipt.provider.as_str()));
    lines.push(format!(
        "Provider reference: {}",
        receipt.provider_ref.as_deref().unwrap_or("-")
    ));
    lines.push("Thank you for subscribing to Trivida Premium.".to_string());
    lines
}

/// Escape a string for a PDF literal; non-ASCII becomes `?` (Helvetica/WinAnsi)
fn pdf_text(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '(' | ')' | '\\' => format!("\\{c}"),
            c if c.is_ascii() && !c.is_ascii_control() => c.to_string(),
            _ => "?".to_string(),
        })
        .collect()
}

/// One-page A4 PDF using the built-in Helvetica font
pub fn render_pdf(receipt: &Receipt) -> Vec<u8> {
    let lines = pdf_lines(receipt);

    let mut content = String::from("BT\n/F1 18 Tf\n50 790 Td\n");
    let mut body = lines.iter();
    if let Some(title) = body.next() {
        let _ = writeln!(content, "({}) Tj", pdf_text(title));
    }
    content.push_str("/F1 11 Tf\n16 TL\n0 -32 Td\n");
    for line in body {
        let _ = writeln!(content, "({}) Tj T*", pdf_text(line));
    }
    content.push_str("ET\n");

    let objects = [
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 595 842] \
         /Resources << /Font << /F1 4 0 R >> >> /Contents 5 0 R >>"
            .to_string(),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>".to_string(),
        format!("<< /Length {} >>\nstream\n{content}endstream", content.len()),
    ];

    let mut out = String::from("%PDF-1.4\n");
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, object) in objects.iter().enumerate() {
        offsets.push(out.len());
        let _ = write!(out, "{} 0 obj\n{object}\nendobj\n", i + 1);
    }

    let xref_offset = out.len();
    let _ = write!(out, "xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1);
    for offset in offsets {
        let _ = write!(out, "{offset:010} 00000 n \n");
    }
    let _ = write!(
        out,
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref_offset}\n%%EOF\n",
        objects.len() + 1
    );

    out.into_bytes()
}
