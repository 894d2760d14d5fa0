use httptest::matchers::{all_of, contains, request, url_decoded};
use httptest::responders::{json_encoded, status_code};
use httptest::{Expectation, Server};
use serde_json::json;
use tempfile::tempdir;

use sitp_geocoder::{
    run, AppConfig, ColumnNames, Dataset, ResolutionCache, ResolutionStatus,
};

const INPUT_CSV: &str = "COD_STATIE;ADRESA_SITP;JUDET
S001;Str. Exemplu 5;Ilfov
S002;Bd. Unirii 10;Bucuresti
S003;Sos. Viilor 20B;Bucuresti
S004;Strada Lipsa;Cluj
S005;Strada Nicaieri;Arad
";

fn expect_search(server: &Server, query: &'static str, body: serde_json::Value) {
    server.expect(
        Expectation::matching(all_of!(
            request::method("GET"),
            request::path("/search"),
            request::query(url_decoded(contains(("q", query)))),
        ))
        .respond_with(json_encoded(body)),
    );
}

#[tokio::test]
async fn resolves_dataset_and_reuses_results_on_rerun() {
    let nominatim = Server::run();
    expect_search(
        &nominatim,
        "Bulevardul Unirii 10, Romania",
        json!([{ "lat": "44.4268", "lon": "26.1025", "display_name": "Bulevardul Unirii" }]),
    );
    expect_search(&nominatim, "Soseaua Viilor 20B, Romania", json!([]));
    expect_search(
        &nominatim,
        "Soseaua Viilor, Romania",
        json!([{ "lat": "44.41", "lon": "26.09" }]),
    );
    expect_search(&nominatim, "Strada Lipsa, Romania", json!([]));
    expect_search(&nominatim, "Strada Nicaieri, Romania", json!([]));

    let registry = Server::run();
    registry.expect(
        Expectation::matching(all_of!(
            request::method("GET"),
            request::path("/ITP"),
            request::query(url_decoded(contains(("searchTerm", "S004")))),
        ))
        .respond_with(json_encoded(json!([
            { "branch": { "address": { "gpsLocation": "46.77,23.59" } } }
        ]))),
    );
    registry.expect(
        Expectation::matching(all_of!(
            request::method("GET"),
            request::path("/ITP"),
            request::query(url_decoded(contains(("searchTerm", "S005")))),
        ))
        .respond_with(status_code(404)),
    );

    let dir = tempdir().unwrap();
    let input_csv = dir.path().join("statii.csv");
    std::fs::write(&input_csv, INPUT_CSV).unwrap();
    let stations_json = dir.path().join("stations_coordinates.json");
    std::fs::write(
        &stations_json,
        json!({ "S001": { "latitude": 44.1, "longitude": 26.2 } }).to_string(),
    )
    .unwrap();

    let config = AppConfig {
        input_csv,
        output_csv: dir.path().join("statii_geoloc.csv"),
        cache_json: dir.path().join("geocode_cache.json"),
        stations_json,
        csv_delimiter: None,
        columns: ColumnNames::default(),
        geocoder_endpoint: nominatim.url("/search").to_string(),
        geocoder_user_agent: "sitp-geocoder-tests".into(),
        geocoder_min_delay_ms: 0,
        geocoder_timeout_secs: 5,
        geocoder_max_attempts: 3,
        geocoder_backoff_ms: 0,
        authority_endpoint: registry.url("/ITP").to_string(),
        checkpoint_every: 2,
    };

    let first = run(&config).await.expect("first run");
    assert_eq!(first.processed, 5);
    assert_eq!(first.station_table_hits, 1);
    assert_eq!(first.geocoded, 1);
    assert_eq!(first.geocoded_without_number, 1);
    assert_eq!(first.authority_hits, 1);
    assert_eq!(first.not_found, 1);
    assert_eq!(first.checkpoints, 3);

    let output = Dataset::load(&config.output_csv, &ColumnNames::default(), None).unwrap();
    assert_eq!(
        output.headers(),
        ["COD_STATIE", "ADRESA_SITP", "JUDET", "LATITUDINE", "LONGITUDINE", "GEOCODER_STATUS"]
    );
    let statuses: Vec<_> = output.records().iter().map(|r| r.status).collect();
    assert_eq!(
        statuses,
        [
            Some(ResolutionStatus::Ok),
            Some(ResolutionStatus::Ok),
            Some(ResolutionStatus::FallbackNoNumber),
            Some(ResolutionStatus::Ok),
            Some(ResolutionStatus::NotFound),
        ]
    );
    assert_eq!(output.records()[0].latitude, Some(44.1));
    assert_eq!(output.records()[3].longitude, Some(23.59));
    assert_eq!(output.records()[4].latitude, None);
    assert_eq!(output.resolved_count(), 4);

    let cache = ResolutionCache::load(&config.cache_json);
    assert_eq!(cache.len(), 5);
    let entry = cache.get("Strada Exemplu 5, Romania").unwrap();
    assert_eq!(
        (entry.latitude(), entry.longitude(), entry.status()),
        (Some(44.1), Some(26.2), ResolutionStatus::Ok)
    );

    // Every expectation above allows a single request, so the rerun must be served locally.
    let second = run(&config).await.expect("second run");
    assert_eq!(second.skipped, 4);
    assert_eq!(second.processed, 1);
    assert_eq!(second.cache_hits, 1);
    assert_eq!(second.not_found, 1);
}

#[tokio::test]
async fn missing_address_column_aborts_before_any_request() {
    let dir = tempdir().unwrap();
    let input_csv = dir.path().join("statii.csv");
    std::fs::write(&input_csv, "COD_STATIE,ADRESA\nS001,Str. Exemplu 5\n").unwrap();

    let mut config = AppConfig::from_env();
    config.input_csv = input_csv;
    config.output_csv = dir.path().join("out.csv");
    config.cache_json = dir.path().join("cache.json");
    config.columns = ColumnNames::default();

    let err = run(&config).await.unwrap_err();
    assert!(err.to_string().contains("ADRESA_SITP"));
    assert!(!config.output_csv.exists());
}
