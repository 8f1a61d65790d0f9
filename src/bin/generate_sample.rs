//! Write a synthetic property registry to `sample_mega_data_set.parquet`.
//!
//! Same column names as the real export (the twelve essential ones plus a
//! handful of extras), with made-up owners, addresses and geometries.

use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{ArrayRef, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;

/// xoshiro256**, seeded. Every run writes the same file, so neighborhood
/// counts and owner lookups against the sample are reproducible.
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

    fn range(&mut self, lo: f64, hi: f64) -> f64 {
        lo + (hi - lo) * self.next_f64()
    }

    fn pick<'a>(&mut self, items: &[&'a str]) -> &'a str {
        items[(self.next_u64() % items.len() as u64) as usize]
    }
}

const ROWS: usize = 5_000;

const BAIRROS: [&str; 8] = [
    "CENTRO", "SAVASSI", "LOURDES", "FUNCIONARIOS", "SANTO AGOSTINHO",
    "SION", "ANCHIETA", "SERRA",
];
const TIPOS: [&str; 4] = ["CASA", "APARTAMENTO", "LOTE", "LOJA"];
const RUAS: [&str; 5] = [
    "RUA DA BAHIA", "AV. AFONSO PENA", "RUA PERNAMBUCO", "RUA DO OURO", "AV. DO CONTORNO",
];
const NOMES: [&str; 6] = ["MARIA", "JOSE", "ANA", "JOAO", "ANTONIO", "FRANCISCA"];
const SOBRENOMES: [&str; 5] = ["SILVA", "SOUZA", "OLIVEIRA", "PEREIRA", "COSTA"];
const ZONAS: [&str; 4] = ["ZC", "ZA", "ZAR-2", "ZP-1"];
/// Owners are drawn from a pool, so most own several properties.
const OWNERS: u64 = 1_200;

/// One owner's CPF in one of the spellings found in the registry export.
fn cpf_spelling(cpf: u64, style: u64) -> String {
    let digits = format!("{cpf:011}");
    match style {
        0 => format!(
            "{}.{}.{}-{}",
            &digits[0..3],
            &digits[3..6],
            &digits[6..9],
            &digits[9..11]
        ),
        // float-typed export: leading zeros lost, ".0" appended
        1 => format!("{cpf}.0"),
        _ => digits,
    }
}

/// Small square around a point, in WKT.
fn square_wkt(lon: f64, lat: f64, side: f64) -> String {
    let (x0, y0, x1, y1) = (lon, lat, lon + side, lat + side);
    format!("MULTIPOLYGON((({x0:.6} {y0:.6}, {x1:.6} {y0:.6}, {x1:.6} {y1:.6}, {x0:.6} {y1:.6}, {x0:.6} {y0:.6})))")
}

fn text(values: Vec<String>) -> ArrayRef {
    Arc::new(StringArray::from(values))
}

fn main() -> Result<()> {
    let mut rng = SimpleRng::new(42);

    let mut documento = Vec::with_capacity(ROWS);
    let mut proprietario = Vec::with_capacity(ROWS);
    let mut bairro = Vec::with_capacity(ROWS);
    let mut endereco = Vec::with_capacity(ROWS);
    let mut complemento = Vec::with_capacity(ROWS);
    let mut indice = Vec::with_capacity(ROWS);
    let mut tipo = Vec::with_capacity(ROWS);
    let mut area_terreno = Vec::with_capacity(ROWS);
    let mut area_construcao = Vec::with_capacity(ROWS);
    let mut ano = Vec::with_capacity(ROWS);
    let mut fracao = Vec::with_capacity(ROWS);
    let mut geometry = Vec::with_capacity(ROWS);
    let mut net_valor = Vec::with_capacity(ROWS);
    let mut zona = Vec::with_capacity(ROWS);

    for row in 0..ROWS {
        let kind = rng.pick(&TIPOS);
        let lot = rng.range(120.0, 900.0);

        let owner = rng.next_u64() % OWNERS;
        let cpf = owner * 83_333_333 % 100_000_000_000;
        documento.push(cpf_spelling(cpf, rng.next_u64() % 3));
        proprietario.push(format!("{} {}", rng.pick(&NOMES), rng.pick(&SOBRENOMES)));
        bairro.push(rng.pick(&BAIRROS).to_string());
        endereco.push(format!("{}, {}", rng.pick(&RUAS), 10 + rng.next_u64() % 2000));
        complemento.push(if kind == "APARTAMENTO" {
            format!("APTO {}", 101 + rng.next_u64() % 1200)
        } else {
            String::new()
        });
        indice.push(format!("{:03}{:03}{:04}", row / 1000, (row / 10) % 1000, row));
        tipo.push(kind.to_string());
        area_terreno.push(lot);
        area_construcao.push(if kind == "LOTE" { 0.0 } else { lot * rng.range(0.4, 2.5) });
        ano.push(1940 + (rng.next_u64() % 84) as i64);
        fracao.push(if kind == "APARTAMENTO" { rng.range(0.01, 0.1) } else { 1.0 });
        geometry.push(square_wkt(
            rng.range(-43.99, -43.90),
            rng.range(-19.98, -19.90),
            0.0002,
        ));
        net_valor.push(lot * rng.range(3_000.0, 12_000.0));
        zona.push(rng.pick(&ZONAS).to_string());
    }

    let columns: Vec<(&str, ArrayRef)> = vec![
        ("INDICE CADASTRAL", text(indice)),
        ("DOCUMENTO PROPRIETARIO", text(documento)),
        ("PROPRIETARIO", text(proprietario)),
        ("ENDERECO", text(endereco)),
        ("COMPLEMENTO ENDERECO", text(complemento)),
        ("BAIRRO", text(bairro)),
        ("ZONA", text(zona)),
        ("TIPO CONSTRUTIVO", text(tipo)),
        ("AREA TERRENO", Arc::new(Float64Array::from(area_terreno))),
        ("AREA CONSTRUCAO", Arc::new(Float64Array::from(area_construcao))),
        ("ANO CONSTRUCAO", Arc::new(Int64Array::from(ano))),
        ("FRACAO IDEAL", Arc::new(Float64Array::from(fracao))),
        ("NET VALOR", Arc::new(Float64Array::from(net_valor))),
        ("GEOMETRY", text(geometry)),
    ];

    let schema = Arc::new(Schema::new(
        columns
            .iter()
            .map(|(name, array)| Field::new(*name, array.data_type().clone(), false))
            .collect::<Vec<_>>(),
    ));
    let batch = RecordBatch::try_new(
        schema.clone(),
        columns.into_iter().map(|(_, array)| array).collect(),
    )
    .context("assembling record batch")?;

    let output_path = "sample_mega_data_set.parquet";
    let file = std::fs::File::create(output_path).context("creating output file")?;
    let mut writer = ArrowWriter::try_new(file, schema, None).context("creating parquet writer")?;
    writer.write(&batch).context("writing batch")?;
    writer.close().context("closing parquet writer")?;

    println!(
        "Wrote {ROWS} properties ({} columns) across {} neighborhoods to {output_path}",
        batch.num_columns(),
        BAIRROS.len()
    );
    Ok(())
}
