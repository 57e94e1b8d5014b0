use crate::output::print_json;
use dor_core::types::CardType;

pub fn run(card_type: Option<CardType>, json: bool) -> anyhow::Result<()> {
    let types: Vec<CardType> = match card_type {
        Some(t) => vec![t],
        None => CardType::all().to_vec(),
    };

    if json {
        let value: serde_json::Map<String, serde_json::Value> = types
            .iter()
            .map(|t| {
                let fields: Vec<&str> = t.required_fields().iter().map(|f| f.as_str()).collect();
                (t.as_str().to_string(), serde_json::json!(fields))
            })
            .collect();
        return print_json(&value);
    }

    for (i, t) in types.iter().enumerate() {
        if i > 0 {
            println!();
        }
        println!("{t}:");
        for field in t.required_fields() {
            println!("  {:<24} {}", field.as_str(), field.label());
        }
    }
    Ok(())
}
