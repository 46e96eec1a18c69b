//! BOLT11 invoice sanity checks.
//!
//! Cheap shape checks only — no bech32 decode. Used to flag implausible
//! invoices coming back from the processor before they reach a wallet.

use crate::error::LightmarketError;

/// Network a lightning invoice settles on, derived from its HRP prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvoiceNetwork {
    Mainnet,
    Testnet,
    Regtest,
}

impl InvoiceNetwork {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceNetwork::Mainnet => "mainnet",
            InvoiceNetwork::Testnet => "testnet",
            InvoiceNetwork::Regtest => "regtest",
        }
    }
}

#[derive(Debug, Clone)]
pub struct InvoiceDetails {
    pub network: InvoiceNetwork,
    pub prefix: String,
    pub length: usize,
}

pub fn validate_invoice(invoice: &str) -> Result<InvoiceDetails, LightmarketError> {
    if invoice.is_empty() {
        return Err(LightmarketError::InvalidInvoice("invoice is empty".into()));
    }

    // lnbcrt before lnbc: the regtest prefix contains the mainnet one.
    let network = if invoice.starts_with("lnbcrt") {
        InvoiceNetwork::Regtest
    } else if invoice.starts_with("lnbc") {
        InvoiceNetwork::Mainnet
    } else if invoice.starts_with("lntb") {
        InvoiceNetwork::Testnet
    } else {
        let shown = &invoice[..invoice.len().min(6)];
        return Err(LightmarketError::InvalidInvoice(format!(
            "unrecognized prefix: {shown}"
        )));
    };

    if invoice.len() < 100 {
        return Err(LightmarketError::InvalidInvoice(format!(
            "too short ({} chars)",
            invoice.len()
        )));
    }
    if invoice.len() > 2000 {
        return Err(LightmarketError::InvalidInvoice(format!(
            "too long ({} chars)",
            invoice.len()
        )));
    }
    if !invoice
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
    {
        return Err(LightmarketError::InvalidInvoice(
            "contains characters outside lowercase alphanumerics".into(),
        ));
    }

    Ok(InvoiceDetails {
        network,
        prefix: invoice[..10].to_string(),
        length: invoice.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invoice_of(prefix: &str, len: usize) -> String {
        let mut s = prefix.to_string();
        while s.len() < len {
            s.push('q');
        }
        s
    }

    #[test]
    fn valid_mainnet_invoice() {
        let details = validate_invoice(&invoice_of("lnbc15u1p", 240)).unwrap();
        assert_eq!(details.network, InvoiceNetwork::Mainnet);
        assert_eq!(details.length, 240);
    }

    #[test]
    fn regtest_prefix_not_mistaken_for_mainnet() {
        let details = validate_invoice(&invoice_of("lnbcrt1p", 240)).unwrap();
        assert_eq!(details.network, InvoiceNetwork::Regtest);
    }

    #[test]
    fn testnet_prefix_classified() {
        let details = validate_invoice(&invoice_of("lntb20m1p", 240)).unwrap();
        assert_eq!(details.network, InvoiceNetwork::Testnet);
    }

    #[test]
    fn rejects_empty_and_foreign_prefixes() {
        assert!(validate_invoice("").is_err());
        assert!(validate_invoice(&invoice_of("bc1qxyz", 240)).is_err());
    }

    #[test]
    fn rejects_out_of_range_lengths() {
        assert!(validate_invoice(&invoice_of("lnbc", 50)).is_err());
        assert!(validate_invoice(&invoice_of("lnbc", 2500)).is_err());
    }

    #[test]
    fn rejects_uppercase_characters() {
        let mut invoice = invoice_of("lnbc", 240);
        invoice.push('Q');
        assert!(validate_invoice(&invoice).is_err());
    }
}
