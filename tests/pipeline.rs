use std::io::{Cursor, Write};
use std::path::Path;

use cnpj_pipeline::discovery::DiscoveryReport;
use cnpj_pipeline::fake::FakeRemote;
use cnpj_pipeline::gold::FOREIGN_DOCUMENT;
use cnpj_pipeline::pipeline::{self, Outcome};
use cnpj_pipeline::table::{Columnar, GoldTable};
use cnpj_pipeline::{Category, RunContext, Settings, Stage};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

const ENDPOINT: &str = "https://portal.test/dados/cnpj/2025-09/";

fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, body) in entries {
        zip.start_file(*name, SimpleFileOptions::default()).unwrap();
        zip.write_all(body).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

fn settings(root: &Path) -> Settings {
    let mut settings = Settings::load_from(&root.join("absent")).unwrap();
    settings.endpoint = ENDPOINT.to_string();
    settings.data_dir = root.join("data");
    settings.logs_dir = root.join("logs");
    settings.report_file = root.join("webscraping_resultado.json");
    settings
}

fn listing() -> String {
    format!(
        r#"<html><body><pre>
<a href="../">Parent Directory</a>
<a href="Empresas0.zip">Empresas0.zip</a>
<a href="Empresas1.zip">Empresas1.zip</a>
<a href='{ENDPOINT}Socios3.zip'>Socios3.zip</a>
<a href="Socios0.zip">Socios0.zip</a>
<a href="Cnaes.zip">Cnaes.zip</a>
<a href="LAYOUT.pdf">LAYOUT.pdf</a>
</pre></body></html>"#
    )
}

fn companies_zip() -> Vec<u8> {
    let rows = "\"11222333\";\"ACME LTDA\";\"2062\";\"49\";\"1000,00\";\"03\";\"\"\n\
\"44555666\";\"BETA ME\";\"2135\";\"50\";\"0,00\";\"01\";\"\"\n\
\"77888999\";\"GAMA SA\";\"2054\";\"10\";\"5000000,00\";\"03\";\"\"\n";
    zip_bytes(&[("LEIAME.txt", &b"see layout"[..]), ("K3241.EMPRECSV", rows.as_bytes())])
}

fn partners_zip() -> Vec<u8> {
    let rows = format!(
        "\"11222333\";\"2\";\"MARIA\";\"***111111**\";\"49\";\"20200101\"\n\
\"11222333\";\"2\";\"JOAO\";\"***222222**\";\"22\";\"20200101\"\n\
\"11222333\";\"2\";\"JOAO\";\"***222222**\";\"22\";\"20210101\"\n\
\"44555666\";\"3\";\"JOHN DOE\";\"{FOREIGN_DOCUMENT}\";\"37\";\"20190101\"\n\
\"77888999\";\"1\";\"HOLDING SA\";\"***333333**\";\"49\";\"20180101\"\n"
    );
    zip_bytes(&[("K3241.SOCIOCSV", rows.as_bytes())])
}

fn remote() -> FakeRemote {
    FakeRemote::new()
        .with_page(ENDPOINT, &listing())
        .with_file(&format!("{ENDPOINT}Empresas0.zip"), companies_zip())
        // Larger and never served: selecting it would fail the download.
        .with_size(&format!("{ENDPOINT}Empresas1.zip"), Some(50_000_000))
        .with_file(&format!("{ENDPOINT}Socios0.zip"), partners_zip())
        .with_size(&format!("{ENDPOINT}Socios3.zip"), None)
}

#[test]
fn end_to_end_builds_gold_and_stage_logs() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = RunContext::new(settings(dir.path())).unwrap();
    ctx.install_subscriber();

    let outcome = pipeline::run(&ctx, &remote());
    assert_eq!(outcome, Outcome::Completed);

    let report = DiscoveryReport::load(ctx.layout().report_file()).unwrap();
    assert_eq!(report.total_candidates, 4);
    assert_eq!(report.smallest[&Category::Companies].name, "Empresas0.zip");
    assert_eq!(report.smallest[&Category::Partners].name, "Socios0.zip");

    assert!(ctx.layout().archive(Category::Companies).exists());
    assert!(ctx.layout().silver_table(Category::Partners).exists());

    let gold = GoldTable::read_parquet(&ctx.layout().gold_table(), 1000).unwrap();
    assert_eq!(gold.key, vec!["11222333", "44555666", "77888999"]);
    assert_eq!(gold.partner_count, vec![2, 1, 1]);
    assert_eq!(gold.foreign_partner, vec![false, true, false]);
    assert_eq!(gold.target, vec![true, false, false]);

    let logs = ctx.layout().logs_dir();
    for stage in Stage::ALL {
        let log = std::fs::read_to_string(logs.join(stage.log_file())).unwrap();
        assert!(!log.is_empty(), "{} log is empty", stage.name());
    }
    let bronze = std::fs::read_to_string(logs.join(Stage::Acquisition.log_file())).unwrap();
    assert!(bronze.contains("Empresas0.zip"));
    let all = std::fs::read_to_string(logs.join("pipeline.log")).unwrap();
    assert!(all.contains("PIPELINE START"));
    assert!(all.contains("PIPELINE COMPLETED"));
}

#[test]
fn empty_listing_fails_at_discovery() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = RunContext::new(settings(dir.path())).unwrap();
    let remote = FakeRemote::new().with_page(ENDPOINT, "<html><a href=\"Cnaes.zip\">x</a></html>");

    assert_eq!(pipeline::run(&ctx, &remote), Outcome::Failed(Stage::Discovery));
    assert!(!ctx.layout().report_file().exists());
}

#[test]
fn stages_run_alone_from_persisted_inputs() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = RunContext::new(settings(dir.path())).unwrap();
    let remote = remote();

    assert!(pipeline::download_from_report(&ctx, &remote).is_err());

    pipeline::discover(&ctx, &remote).unwrap();
    let archives = pipeline::download_from_report(&ctx, &remote).unwrap();
    assert_eq!(archives.len(), 2);

    let silver = pipeline::clean_existing(&ctx).unwrap();
    assert_eq!(silver.companies.len(), 3);
    assert_eq!(silver.partners.len(), 5);

    let gold = pipeline::aggregate(&ctx).unwrap();
    assert_eq!(gold.len(), 3);
}

#[test]
fn unusable_archives_stop_at_cleaning() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = RunContext::new(settings(dir.path())).unwrap();
    let narrow = zip_bytes(&[("DATA.CSV", "\"1\";\"2\"\n".repeat(100).as_bytes())]);
    let remote = FakeRemote::new()
        .with_page(ENDPOINT, &listing())
        .with_file(&format!("{ENDPOINT}Empresas0.zip"), narrow.clone())
        .with_size(&format!("{ENDPOINT}Empresas1.zip"), None)
        .with_file(&format!("{ENDPOINT}Socios0.zip"), narrow);

    assert_eq!(pipeline::run(&ctx, &remote), Outcome::Failed(Stage::Cleaning));
    assert!(!ctx.layout().gold_table().exists());
}
