// src/shopping_list.rs
use crate::models::CartLine;
use actix_web::{
    HttpResponse,
    http::header::{self, ContentType},
};
use std::collections::HashMap;
use std::fmt::Write;

pub const FILENAME: &str = "shopping_cart.txt";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShoppingItem {
    pub name: String,
    pub measurement_unit: String,
    pub total_amount: i64,
}

/// Sums amounts per (name, unit). Items keep the order in which their first
/// line arrived, so callers pass lines already sorted the way the list
/// should read.
pub fn aggregate<I>(lines: I) -> Vec<ShoppingItem>
where
    I: IntoIterator<Item = CartLine>,
{
    let mut items: Vec<ShoppingItem> = Vec::new();
    let mut positions: HashMap<(String, String), usize> = HashMap::new();
    for line in lines {
        let amount = i64::from(line.amount);
        let key = (line.name, line.measurement_unit);
        match positions.get(&key) {
            Some(&at) => items[at].total_amount += amount,
            None => {
                items.push(ShoppingItem {
                    name: key.0.clone(),
                    measurement_unit: key.1.clone(),
                    total_amount: amount,
                });
                positions.insert(key, items.len() - 1);
            }
        }
    }
    items
}

pub fn render(items: &[ShoppingItem]) -> String {
    let mut body = String::new();
    for item in items {
        // Writing into a String cannot fail.
        let _ = writeln!(
            body,
            "{} {} {}",
            item.name, item.total_amount, item.measurement_unit
        );
    }
    body
}

/// The list as a plain-text attachment.
pub fn download(items: &[ShoppingItem]) -> HttpResponse {
    HttpResponse::Ok()
        .insert_header(ContentType::plaintext())
        .insert_header((
            header::CONTENT_DISPOSITION,
            format!("attachment; filename={FILENAME}"),
        ))
        .body(render(items))
}
