//! Basic usage: build a forest, query it, save it and serve it from a memory map.
//!
//! Run with: cargo run --example basic_usage

use forge_ann::{recall_at_k, AnnIndex, Dataset, IndexConfig, KeyedIndex, Metric};
use std::time::Instant;
use tracing_subscriber::EnvFilter;

fn main() -> forge_ann::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    println!("=== forge-ann Demo ===\n");

    let dim = 32;
    let mut data = Dataset::generate(20_000, 100, dim, 42);
    data.compute_ground_truth(10, Metric::Angular);

    let mut index = AnnIndex::new(IndexConfig::new(dim, Metric::Angular).seed(7).verbose(true))?;
    for (id, vector) in data.vectors.iter().enumerate() {
        index.add_item(id as u32, vector)?;
    }

    let start = Instant::now();
    index.build(25)?;
    println!(
        "Built {} trees over {} items in {:.2?}",
        index.n_trees(),
        index.n_items(),
        start.elapsed()
    );
    println!("{}", index.statistics()?.summary());

    println!("\n=== Recall vs search_k ===\n");
    for search_k in [100, 1_000, 5_000, 20_000] {
        let start = Instant::now();
        let recall: f32 = data
            .queries
            .iter()
            .zip(&data.ground_truth)
            .map(|(query, truth)| -> forge_ann::Result<f32> {
                let found = index.get_nns_by_vector(query, 10, Some(search_k))?;
                Ok(recall_at_k(&found.ids, truth, 10))
            })
            .sum::<forge_ann::Result<f32>>()?
            / data.queries.len() as f32;
        println!(
            "search_k={:>6}  recall@10={:.3}  {:.2?}/query",
            search_k,
            recall,
            start.elapsed() / data.queries.len() as u32
        );
    }

    println!("\n=== Save and memory-map ===\n");
    let path = std::env::temp_dir().join("forge_ann_demo.ann");
    index.save(&path, false)?;

    let mut served = AnnIndex::new(IndexConfig::new(dim, Metric::Angular))?;
    served.load(&path, true)?;
    println!("Loaded {} ({} items, state {})", path.display(), served.n_items(), served.state());

    let neighbors = served.get_nns_by_item(0, 5, None)?;
    for (id, distance) in neighbors.iter() {
        println!("  item {:>5}  distance {:.4}", id, distance);
    }
    served.unload()?;

    println!("\n=== Keyed index ===\n");
    let mut cities = KeyedIndex::<String>::new(IndexConfig::new(2, Metric::Euclidean).seed(1))?;
    for (name, position) in [
        ("berlin", [52.52, 13.40]),
        ("hamburg", [53.55, 9.99]),
        ("munich", [48.14, 11.58]),
        ("vienna", [48.21, 16.37]),
    ] {
        cities.put(name.to_string(), &position)?;
    }
    cities.build(5)?;

    let (keys, distances) = cities.get_nns_by_key(&"munich".to_string(), 3, None)?;
    for (key, distance) in keys.iter().zip(distances) {
        println!("  {:<8} {:.2}", key, distance);
    }

    std::fs::remove_file(&path)?;
    Ok(())
}
