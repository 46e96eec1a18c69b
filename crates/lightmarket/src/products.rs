//! Storefront catalog of digital goods.
//!
//! Prices are set in USD; the sats price is computed per request from the
//! cached exchange rate so the invoice amount tracks the market.

use serde::Serialize;

use crate::error::LightmarketError;
use crate::rates::RateCache;

/// A digital good in the storefront catalog.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub price_usd: f64,
    pub category: &'static str,
    pub image: &'static str,
    pub featured: bool,
    pub tags: &'static [&'static str],
}

/// A product with its price converted to sats at the current rate.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PricedProduct {
    #[serde(flatten)]
    pub product: Product,
    pub price_sats: u64,
}

static CATALOG: [Product; 6] = [
    Product {
        id: "ui-kit-1",
        name: "Modern Dashboard UI Kit",
        description: "Complete dashboard UI components with 50+ screens and dark/light themes.",
        price_usd: 1.99,
        category: "UI Kits",
        image: "https://images.unsplash.com/photo-1551650975-87deedd944c3?w=400&h=300&fit=crop&auto=format",
        featured: true,
        tags: &["dashboard", "admin", "react", "figma"],
    },
    Product {
        id: "icon-pack-1",
        name: "Lightning Icon Pack",
        description: "500+ premium icons optimized for web and mobile applications.",
        price_usd: 0.99,
        category: "Icons",
        image: "https://images.unsplash.com/photo-1618005182384-a83a8bd57fbe?w=400&h=300&fit=crop&auto=format",
        featured: false,
        tags: &["icons", "svg", "web", "mobile"],
    },
    Product {
        id: "photo-1",
        name: "Workspace Stock Photo",
        description: "High-resolution workspace photo perfect for landing pages and presentations.",
        price_usd: 0.50,
        category: "Photos",
        image: "https://images.unsplash.com/photo-1497366216548-37526070297c?w=400&h=300&fit=crop&auto=format",
        featured: false,
        tags: &["workspace", "office", "business", "stock"],
    },
    Product {
        id: "font-1",
        name: "Geometric Sans Font Family",
        description: "Modern geometric font family with 8 weights and italic variants.",
        price_usd: 1.50,
        category: "Fonts",
        image: "https://images.unsplash.com/photo-1586953208448-b95a79798f07?w=400&h=300&fit=crop&auto=format",
        featured: true,
        tags: &["typography", "geometric", "modern", "family"],
    },
    Product {
        id: "template-1",
        name: "Landing Page Template",
        description: "Conversion-optimized landing page template built with React and Tailwind.",
        price_usd: 1.25,
        category: "Templates",
        image: "https://images.unsplash.com/photo-1460925895917-afdab827c52f?w=400&h=300&fit=crop&auto=format",
        featured: false,
        tags: &["landing", "react", "tailwind", "conversion"],
    },
    Product {
        id: "micro-1",
        name: "Coffee Tip",
        description: "Support the development with a small tip - like buying me a coffee!",
        price_usd: 0.25,
        category: "Tips",
        image: "https://images.unsplash.com/photo-1495474472287-4d71bcdd2085?w=400&h=300&fit=crop&auto=format",
        featured: false,
        tags: &["tip", "support", "coffee", "micro"],
    },
];

pub fn catalog() -> &'static [Product] {
    &CATALOG
}

pub fn find(id: &str) -> Option<&'static Product> {
    CATALOG.iter().find(|p| p.id == id)
}

/// The full catalog with sats prices at the current exchange rate.
pub async fn priced_catalog(rates: &RateCache) -> Result<Vec<PricedProduct>, LightmarketError> {
    let mut priced = Vec::with_capacity(CATALOG.len());
    for product in &CATALOG {
        priced.push(PricedProduct {
            product: product.clone(),
            price_sats: rates.usd_to_sats(product.price_usd).await?,
        });
    }
    Ok(priced)
}

/// One product with its sats price, `None` for an unknown id.
pub async fn priced_product(
    id: &str,
    rates: &RateCache,
) -> Result<Option<PricedProduct>, LightmarketError> {
    let Some(product) = find(id) else {
        return Ok(None);
    };
    Ok(Some(PricedProduct {
        product: product.clone(),
        price_sats: rates.usd_to_sats(product.price_usd).await?,
    }))
}
