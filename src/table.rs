//! Columnar tables handed between stages, and their parquet persistence.
//!
//! Column names in the files are the contract with the dashboard and keep the
//! registry's own vocabulary (`cnpj`, `cod_porte`, ...).

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use arrow_array::{Array, ArrayRef, BooleanArray, Float64Array, Int64Array, RecordBatch, StringArray};
use arrow_schema::{DataType, Field, Schema, SchemaRef};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use parquet::format::KeyValue;

use crate::error::{PipelineError, Result};

/// Cleaned `empresas` rows, one vector per column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompanyTable {
    pub key: Vec<String>,
    pub legal_name: Vec<Option<String>>,
    pub legal_nature: Vec<Option<i64>>,
    pub responsible_qualification: Vec<Option<i64>>,
    pub share_capital: Vec<Option<f64>>,
    pub size_code: Vec<Option<String>>,
}

/// Cleaned `socios` rows, one vector per column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartnerTable {
    pub key: Vec<String>,
    pub partner_type: Vec<Option<i64>>,
    pub partner_name: Vec<Option<String>>,
    pub partner_document: Vec<Option<String>>,
    pub qualification_code: Vec<Option<String>>,
}

/// Final denormalized table: one row per company key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GoldTable {
    pub key: Vec<String>,
    pub partner_count: Vec<i64>,
    pub foreign_partner: Vec<bool>,
    pub target: Vec<bool>,
}

/// Shared by the three tables for schema-driven persistence.
pub trait Columnar: Sized + Default {
    const NAME: &'static str;

    fn schema() -> SchemaRef;
    fn len(&self) -> usize;
    fn to_batch(&self) -> Result<RecordBatch>;
    fn append_batch(&mut self, batch: &RecordBatch) -> Result<()>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write the table as a single-batch parquet file, replacing `path`.
    fn write_parquet(&self, path: &Path) -> Result<()> {
        let batch = self.to_batch()?;
        let file = File::create(path)?;
        let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(writer_properties()))?;
        writer.write(&batch)?;
        writer.close()?;
        Ok(())
    }

    /// Load a table written by [`Columnar::write_parquet`], `batch_size` rows at a time.
    fn read_parquet(path: &Path, batch_size: usize) -> Result<Self> {
        let file = File::open(path)?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)?
            .with_batch_size(batch_size.max(1))
            .build()?;
        let mut table = Self::default();
        for batch in reader {
            let batch = batch?;
            tracing::debug!("{}: batch of {} rows", Self::NAME, batch.num_rows());
            table.append_batch(&batch)?;
        }
        Ok(table)
    }
}

fn writer_properties() -> WriterProperties {
    let created_by = KeyValue {
        key: "created_by".to_string(),
        value: Some(concat!("cnpj_pipeline ", env!("CARGO_PKG_VERSION")).to_string()),
    };
    WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .set_key_value_metadata(Some(vec![created_by]))
        .build()
}

fn column<'a, A: Array + 'static>(batch: &'a RecordBatch, table: &str, name: &str) -> Result<&'a A> {
    batch
        .column_by_name(name)
        .ok_or_else(|| PipelineError::schema(table, format!("missing column `{}`", name)))?
        .as_any()
        .downcast_ref::<A>()
        .ok_or_else(|| PipelineError::schema(table, format!("column `{}` has an unexpected type", name)))
}

fn strings(arr: &StringArray) -> impl Iterator<Item = Option<String>> + '_ {
    arr.iter().map(|v| v.map(str::to_string))
}

fn build(schema: SchemaRef, columns: Vec<ArrayRef>) -> Result<RecordBatch> {
    Ok(RecordBatch::try_new(schema, columns)?)
}

impl Columnar for CompanyTable {
    const NAME: &'static str = "empresas";

    fn schema() -> SchemaRef {
        Arc::new(Schema::new(vec![
            Field::new("cnpj", DataType::Utf8, false),
            Field::new("razao_social", DataType::Utf8, true),
            Field::new("natureza_juridica", DataType::Int64, true),
            Field::new("qualificacao_responsavel", DataType::Int64, true),
            Field::new("capital_social", DataType::Float64, true),
            Field::new("cod_porte", DataType::Utf8, true),
        ]))
    }

    fn len(&self) -> usize {
        self.key.len()
    }

    fn to_batch(&self) -> Result<RecordBatch> {
        build(
            Self::schema(),
            vec![
                Arc::new(StringArray::from_iter_values(&self.key)),
                Arc::new(StringArray::from(self.legal_name.clone())),
                Arc::new(Int64Array::from(self.legal_nature.clone())),
                Arc::new(Int64Array::from(self.responsible_qualification.clone())),
                Arc::new(Float64Array::from(self.share_capital.clone())),
                Arc::new(StringArray::from(self.size_code.clone())),
            ],
        )
    }

    fn append_batch(&mut self, batch: &RecordBatch) -> Result<()> {
        let t = Self::NAME;
        let key = column::<StringArray>(batch, t, "cnpj")?;
        self.key.extend(key.iter().map(|v| v.unwrap_or_default().to_string()));
        self.legal_name.extend(strings(column(batch, t, "razao_social")?));
        self.legal_nature
            .extend(column::<Int64Array>(batch, t, "natureza_juridica")?.iter());
        self.responsible_qualification
            .extend(column::<Int64Array>(batch, t, "qualificacao_responsavel")?.iter());
        self.share_capital
            .extend(column::<Float64Array>(batch, t, "capital_social")?.iter());
        self.size_code.extend(strings(column(batch, t, "cod_porte")?));
        Ok(())
    }
}

impl Columnar for PartnerTable {
    const NAME: &'static str = "socios";

    fn schema() -> SchemaRef {
        Arc::new(Schema::new(vec![
            Field::new("cnpj", DataType::Utf8, false),
            Field::new("tipo_socio", DataType::Int64, true),
            Field::new("nome_socio", DataType::Utf8, true),
            Field::new("documento_socio", DataType::Utf8, true),
            Field::new("codigo_qualificacao", DataType::Utf8, true),
        ]))
    }

    fn len(&self) -> usize {
        self.key.len()
    }

    fn to_batch(&self) -> Result<RecordBatch> {
        build(
            Self::schema(),
            vec![
                Arc::new(StringArray::from_iter_values(&self.key)),
                Arc::new(Int64Array::from(self.partner_type.clone())),
                Arc::new(StringArray::from(self.partner_name.clone())),
                Arc::new(StringArray::from(self.partner_document.clone())),
                Arc::new(StringArray::from(self.qualification_code.clone())),
            ],
        )
    }

    fn append_batch(&mut self, batch: &RecordBatch) -> Result<()> {
        let t = Self::NAME;
        let key = column::<StringArray>(batch, t, "cnpj")?;
        self.key.extend(key.iter().map(|v| v.unwrap_or_default().to_string()));
        self.partner_type
            .extend(column::<Int64Array>(batch, t, "tipo_socio")?.iter());
        self.partner_name.extend(strings(column(batch, t, "nome_socio")?));
        self.partner_document
            .extend(strings(column(batch, t, "documento_socio")?));
        self.qualification_code
            .extend(strings(column(batch, t, "codigo_qualificacao")?));
        Ok(())
    }
}

impl Columnar for GoldTable {
    const NAME: &'static str = "cnpj_gold";

    fn schema() -> SchemaRef {
        Arc::new(Schema::new(vec![
            Field::new("cnpj", DataType::Utf8, false),
            Field::new("qtde_socios", DataType::Int64, false),
            Field::new("flag_socio_estrangeiro", DataType::Boolean, false),
            Field::new("doc_alvo", DataType::Boolean, false),
        ]))
    }

    fn len(&self) -> usize {
        self.key.len()
    }

    fn to_batch(&self) -> Result<RecordBatch> {
        build(
            Self::schema(),
            vec![
                Arc::new(StringArray::from_iter_values(&self.key)),
                Arc::new(Int64Array::from(self.partner_count.clone())),
                Arc::new(BooleanArray::from(self.foreign_partner.clone())),
                Arc::new(BooleanArray::from(self.target.clone())),
            ],
        )
    }

    fn append_batch(&mut self, batch: &RecordBatch) -> Result<()> {
        let t = Self::NAME;
        let key = column::<StringArray>(batch, t, "cnpj")?;
        self.key.extend(key.iter().map(|v| v.unwrap_or_default().to_string()));
        let count = column::<Int64Array>(batch, t, "qtde_socios")?;
        self.partner_count.extend(count.iter().map(|v| v.unwrap_or(0)));
        let flag = column::<BooleanArray>(batch, t, "flag_socio_estrangeiro")?;
        self.foreign_partner.extend(flag.iter().map(|v| v.unwrap_or(false)));
        let target = column::<BooleanArray>(batch, t, "doc_alvo")?;
        self.target.extend(target.iter().map(|v| v.unwrap_or(false)));
        Ok(())
    }
}

/// Row count and column names of a parquet file, read from its footer only.
pub fn describe(path: &Path) -> Result<(usize, Vec<String>)> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(File::open(path)?)?;
    let rows = builder.metadata().file_metadata().num_rows().max(0) as usize;
    let columns = builder
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect();
    Ok((rows, columns))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn companies() -> CompanyTable {
        CompanyTable {
            key: vec!["11222333".into(), "44555666".into(), "abc".into()],
            legal_name: vec![Some("ACME LTDA".into()), None, Some("JOSÉ ÇÃO".into())],
            legal_nature: vec![Some(2062), None, Some(2135)],
            responsible_qualification: vec![Some(49), Some(50), None],
            share_capital: vec![Some(1234.56), None, Some(0.0)],
            size_code: vec![Some("03".into()), Some("01".into()), None],
        }
    }

    fn assert_same_fields(expected: &SchemaRef, path: &Path) {
        let reader = ParquetRecordBatchReaderBuilder::try_new(File::open(path).unwrap()).unwrap();
        assert_eq!(reader.schema().fields(), expected.fields());
    }

    #[test]
    fn company_table_survives_parquet() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empresas_silver.parquet");
        let table = companies();
        table.write_parquet(&path).unwrap();

        let back = CompanyTable::read_parquet(&path, 2).unwrap();
        assert_eq!(back.len(), table.len());
        assert_eq!(back, table);
        assert_same_fields(&CompanyTable::schema(), &path);
    }

    #[test]
    fn partner_and_gold_tables_survive_parquet() {
        let dir = tempfile::tempdir().unwrap();

        let partners = PartnerTable {
            key: vec!["11222333".into(), "11222333".into()],
            partner_type: vec![Some(2), None],
            partner_name: vec![Some("MARIA".into()), Some("JOHN DOE".into())],
            partner_document: vec![Some("***123456**".into()), Some("***999999**".into())],
            qualification_code: vec![Some("49".into()), None],
        };
        let p_path = dir.path().join("socios_silver.parquet");
        partners.write_parquet(&p_path).unwrap();
        assert_eq!(PartnerTable::read_parquet(&p_path, 100).unwrap(), partners);
        assert_same_fields(&PartnerTable::schema(), &p_path);

        let gold = GoldTable {
            key: vec!["11222333".into(), "44555666".into()],
            partner_count: vec![2, 0],
            foreign_partner: vec![true, false],
            target: vec![true, false],
        };
        let g_path = dir.path().join("cnpj_gold.parquet");
        gold.write_parquet(&g_path).unwrap();
        assert_eq!(GoldTable::read_parquet(&g_path, 1).unwrap(), gold);
        assert_same_fields(&GoldTable::schema(), &g_path);

        let (rows, columns) = describe(&g_path).unwrap();
        assert_eq!(rows, 2);
        assert_eq!(columns, ["cnpj", "qtde_socios", "flag_socio_estrangeiro", "doc_alvo"]);
    }

    #[test]
    fn empty_table_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.parquet");
        GoldTable::default().write_parquet(&path).unwrap();
        let back = GoldTable::read_parquet(&path, 10).unwrap();
        assert!(back.is_empty());
        assert_same_fields(&GoldTable::schema(), &path);
    }

    #[test]
    fn wrong_file_is_a_schema_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gold.parquet");
        let gold = GoldTable {
            key: vec!["11222333".into()],
            partner_count: vec![1],
            foreign_partner: vec![false],
            target: vec![false],
        };
        gold.write_parquet(&path).unwrap();
        let err = PartnerTable::read_parquet(&path, 10).unwrap_err();
        assert!(matches!(err, PipelineError::SchemaMismatch { .. }));
    }
}
