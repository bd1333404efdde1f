use anyhow::{Context, Result};
use serde_json::{json, Map, Value};

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    fn pick<'a, T>(&mut self, items: &'a [T]) -> &'a T {
        &items[(self.next_u64() % items.len() as u64) as usize]
    }

    /// Log-normal-ish gene length in base pairs.
    fn gene_length(&mut self) -> f64 {
        (300.0 + 6000.0 * self.next_f64().powi(2)).round()
    }
}

fn main() -> Result<()> {
    let mut rng = SimpleRng::new(42);

    let organisms = [
        ("Pf3D7", "Plasmodium falciparum 3D7", 14),
        ("PvP01", "Plasmodium vivax P01", 14),
        ("TgME49", "Toxoplasma gondii ME49", 13),
    ];
    let releases = ["2015-03", "2017-10", "2019-06", "2021-01-15", "2023-08-30"];
    let gene_count = 300;

    let fields = json!([
        { "term": "genome", "display": "Genome", "type": "string" },
        { "term": "organism", "display": "Organism", "type": "string", "parent": "genome" },
        { "term": "chromosome", "display": "Chromosome", "type": "string", "parent": "genome" },
        { "term": "length", "display": "Gene length", "type": "number", "isRange": true },
        { "term": "released", "display": "Release date", "type": "date", "isRange": true },
    ]);

    let mut data = Vec::with_capacity(gene_count);
    let mut organism_meta = Map::new();
    let mut chromosome_meta = Map::new();
    let mut length_meta = Map::new();
    let mut released_meta = Map::new();

    for i in 0..gene_count {
        let &(prefix, organism, chromosomes) = rng.pick(&organisms);
        let chromosome = (rng.next_u64() % chromosomes) + 1;
        let term = format!("{prefix}_{chromosome:02}{i:05}");

        data.push(json!({ "term": term, "display": format!("{term} hypothetical protein") }));
        organism_meta.insert(term.clone(), json!(organism));
        chromosome_meta.insert(term.clone(), json!(format!("{chromosome}")));
        // About one gene in ten has no recorded length.
        if rng.next_f64() > 0.1 {
            length_meta.insert(term.clone(), json!(rng.gene_length()));
        }
        released_meta.insert(term, json!(rng.pick(&releases)));
    }

    let dataset = json!({
        "fields": fields,
        "data": data,
        "columns": ["organism", "length"],
        "metadata": {
            "organism": Value::Object(organism_meta),
            "chromosome": Value::Object(chromosome_meta),
            "length": Value::Object(length_meta),
            "released": Value::Object(released_meta),
        },
    });

    let output_path = std::env::args().nth(1).unwrap_or_else(|| "sample_data.json".to_string());
    let text = serde_json::to_string_pretty(&dataset).context("serializing sample dataset")?;
    std::fs::write(&output_path, text).with_context(|| format!("writing {output_path}"))?;

    println!("Wrote {gene_count} genes to {output_path}");
    Ok(())
}
