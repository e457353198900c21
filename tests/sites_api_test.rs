mod common;

use serde_json::json;

use manga_harvester::chapter::ChapterDownloader;
use manga_harvester::error::DownloadError;
use manga_harvester::resolver::{ProbeKind, Resolution, Transfer};
use manga_harvester::sites::{MediocreToons, SiteAdapter, SussyToons};

const SUSSY_WORK: &str = "https://www.sussytoons.wtf/obra/1234/a-espada";

async fn sussy_catalog_mock(server: &mut mockito::Server) -> mockito::Mock {
    let body = json!({
        "success": true,
        "resultado": {
            "obr_nome": "A Espada: Volume Único",
            "capitulos": [
                { "cap_id": 12, "cap_numero": "2.5" },
                { "cap_id": 11, "cap_numero": 2 },
                { "cap_id": 10, "cap_numero": 1 },
                { "cap_id": 0, "cap_numero": 0 }
            ]
        }
    });
    server
        .mock("GET", "/obras/1234")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(body.to_string())
        .create_async()
        .await
}

#[tokio::test]
async fn test_sussytoons_catalog_from_api() {
    let mut server = mockito::Server::new_async().await;
    let mock = sussy_catalog_mock(&mut server).await;
    let adapter = SussyToons::with_endpoints(&server.url(), &server.url(), "https://www.sussytoons.wtf");
    let mut session = common::http_session();

    let catalog = adapter.fetch_catalog(SUSSY_WORK, &mut session).await.unwrap();

    mock.assert_async().await;
    assert_eq!(catalog.name, "A Espada: Volume Único");
    let numbers: Vec<f64> = catalog.chapters().iter().map(|c| c.number.value()).collect();
    assert_eq!(numbers, vec![1.0, 2.0, 2.5]);
    assert_eq!(catalog.chapters()[0].id, Some(10));
    assert_eq!(catalog.chapters()[0].url, "https://www.sussytoons.wtf/capitulo/10");
    assert_eq!(catalog.chapters()[2].work_id.as_deref(), Some("1234"));
    assert!(catalog.chapters().iter().all(|c| c.available));
}

#[tokio::test]
async fn test_sussytoons_api_error_is_catalog_unavailable() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/obras/1234")
        .with_status(200)
        .with_body(json!({ "success": false, "message": "Obra não encontrada" }).to_string())
        .create_async()
        .await;
    let adapter = SussyToons::with_endpoints(&server.url(), &server.url(), "https://www.sussytoons.wtf");
    let mut session = common::http_session();

    match adapter.fetch_catalog(SUSSY_WORK, &mut session).await {
        Err(DownloadError::CatalogUnavailable(message)) => assert_eq!(message, "Obra não encontrada"),
        other => panic!("expected CatalogUnavailable, got {:?}", other.map(|c| c.name)),
    }
}

#[tokio::test]
async fn test_sussytoons_pages_from_api() {
    let mut server = mockito::Server::new_async().await;
    let _catalog = sussy_catalog_mock(&mut server).await;
    let _pages = server
        .mock("GET", "/capitulos/10")
        .with_status(200)
        .with_body(
            json!({
                "success": true,
                "resultado": {
                    "cap_paginas": [
                        { "src": "01.webp", "path": "/scans/1/obras/1234/capitulos/1/" },
                        { "src": "/manga_1234/ch1/02.jpg" }
                    ]
                }
            })
            .to_string(),
        )
        .create_async()
        .await;
    let adapter = SussyToons::with_endpoints(&server.url(), "https://cdn.example.site", "https://www.sussytoons.wtf");
    let mut session = common::http_session();
    let catalog = adapter.fetch_catalog(SUSSY_WORK, &mut session).await.unwrap();

    let resolution = adapter.resolve_chapter(&catalog.chapters()[0], &mut session).await.unwrap();

    let Resolution::Assets(list) = resolution else {
        panic!("expected an asset list");
    };
    assert_eq!(list.transfer, Transfer::plain());
    let sources: Vec<&str> = list.assets.iter().map(|a| a.source.as_str()).collect();
    assert_eq!(
        sources,
        vec![
            "https://cdn.example.site/scans/1/obras/1234/capitulos/1/01.webp",
            "https://cdn.example.site/wp-content/uploads/WP-manga/data/manga_1234/ch1/02.jpg",
        ]
    );
    assert_eq!(list.assets[0].file_name(list.name_width), "001.webp");
}

#[tokio::test]
async fn test_sussytoons_locked_chapter_falls_back_to_guessing() {
    let mut server = mockito::Server::new_async().await;
    let _catalog = sussy_catalog_mock(&mut server).await;
    let _locked = server
        .mock("GET", "/capitulos/12")
        .with_status(200)
        .with_body(json!({ "success": true, "resultado": { "cap_paginas": [] } }).to_string())
        .create_async()
        .await;
    let _first = server
        .mock("GET", "/scans/1/obras/1234/capitulos/2_5/00.jpg")
        .with_status(200)
        .with_body("page-one")
        .create_async()
        .await;
    let _second = server
        .mock("GET", "/scans/1/obras/1234/capitulos/2_5/01.jpg")
        .with_status(200)
        .with_body("page-two")
        .create_async()
        .await;

    let adapter = SussyToons::with_endpoints(&server.url(), &server.url(), "https://www.sussytoons.wtf");
    let mut session = common::http_session();
    let catalog = adapter.fetch_catalog(SUSSY_WORK, &mut session).await.unwrap();
    let locked = catalog.chapters()[2].clone();

    let Resolution::Sequence(plan) = adapter.resolve_chapter(&locked, &mut session).await.unwrap() else {
        panic!("expected a guessing plan");
    };
    assert_eq!(plan.base_url, format!("{}/scans/1/obras/1234/capitulos/2_5/", server.url()));
    assert_eq!(plan.start_index, 0);
    assert_eq!(plan.probe, ProbeKind::Http);

    let dir = tempfile::tempdir().unwrap();
    let settings = common::test_settings(dir.path());
    let outcome = ChapterDownloader::new(&settings)
        .download(&adapter, &locked, &mut session, dir.path())
        .await;

    assert_eq!(outcome.downloaded, 2);
    assert_eq!(outcome.failed, 0);
    assert!(outcome.inferred);
    let folder = dir.path().join("Chapter 02.5");
    assert_eq!(std::fs::read(folder.join("001.jpg")).unwrap(), b"page-one");
    assert_eq!(std::fs::read(folder.join("002.jpg")).unwrap(), b"page-two");
}

#[tokio::test]
async fn test_sussytoons_unavailable_chapter_goes_straight_to_guessing() {
    let mut server = mockito::Server::new_async().await;
    let _catalog = server
        .mock("GET", "/obras/1234")
        .with_status(200)
        .with_body(
            json!({
                "success": true,
                "resultado": {
                    "obr_nome": "A Espada",
                    "capitulos": [
                        { "cap_id": 21, "cap_numero": 4, "cap_disponivel": false },
                        { "cap_id": 20, "cap_numero": 3, "cap_disponivel": true }
                    ]
                }
            })
            .to_string(),
        )
        .create_async()
        .await;
    let locked_api = server
        .mock("GET", "/capitulos/21")
        .with_status(200)
        .with_body(json!({ "success": true, "resultado": { "cap_paginas": [ { "src": "/x/01.jpg" } ] } }).to_string())
        .expect(0)
        .create_async()
        .await;
    let open_api = server
        .mock("GET", "/capitulos/20")
        .with_status(200)
        .with_body(json!({ "success": true, "resultado": { "cap_paginas": [ { "src": "/x/01.jpg" } ] } }).to_string())
        .expect(1)
        .create_async()
        .await;

    let adapter = SussyToons::with_endpoints(&server.url(), &server.url(), "https://www.sussytoons.wtf");
    let mut session = common::http_session();
    let catalog = adapter.fetch_catalog(SUSSY_WORK, &mut session).await.unwrap();
    let (open, locked) = (&catalog.chapters()[0], &catalog.chapters()[1]);
    assert!(open.available);
    assert!(!locked.available);

    let Resolution::Assets(list) = adapter.resolve_chapter(open, &mut session).await.unwrap() else {
        panic!("expected an asset list for the open chapter");
    };
    assert_eq!(list.assets.len(), 1);

    let Resolution::Sequence(plan) = adapter.resolve_chapter(locked, &mut session).await.unwrap() else {
        panic!("expected a guessing plan for the locked chapter");
    };
    assert_eq!(plan.base_url, format!("{}/scans/1/obras/1234/capitulos/4/", server.url()));

    open_api.assert_async().await;
    locked_api.assert_async().await;
}

#[tokio::test]
async fn test_mediocretoons_catalog_and_pages() {
    let mut server = mockito::Server::new_async().await;
    let _work = server
        .mock("GET", "/obras/77")
        .match_header("x-app-key", "toons-mediocre-app")
        .with_status(200)
        .with_body(
            json!({
                "nome": "Torre Sem Fim",
                "capitulos": [
                    { "id": 502, "numero": 3 },
                    { "id": 501, "numero": "1.5" },
                    { "id": null, "numero": 2 }
                ]
            })
            .to_string(),
        )
        .create_async()
        .await;
    let _pages = server
        .mock("GET", "/capitulos/501")
        .with_status(200)
        .with_body(json!({ "paginas": [ { "src": "a1" }, { "src": "a2.jpg" }, { "src": "  " } ] }).to_string())
        .create_async()
        .await;

    let adapter = MediocreToons::with_endpoints(&server.url(), "https://cdn.mediocretoons.com", "https://mediocretoons.com");
    let http = manga_harvester::session::HttpSession::new(adapter.default_headers(), std::time::Duration::from_secs(5)).unwrap();
    let mut session = manga_harvester::session::AcquisitionSession::new(http, None, Default::default());

    let catalog = adapter
        .fetch_catalog("https://mediocretoons.com/work/77/torre", &mut session)
        .await
        .unwrap();
    assert_eq!(catalog.name, "Torre Sem Fim");
    let numbers: Vec<f64> = catalog.chapters().iter().map(|c| c.number.value()).collect();
    assert_eq!(numbers, vec![1.5, 3.0]);

    let Resolution::Assets(list) = adapter.resolve_chapter(&catalog.chapters()[0], &mut session).await.unwrap() else {
        panic!("expected an asset list");
    };
    assert_eq!(list.assets.len(), 3);
    assert_eq!(list.assets[0].source, "https://cdn.mediocretoons.com/obras/77/capitulos/1.5/a1");
    assert_eq!(list.assets[0].file_name(3), "001.webp");
    assert_eq!(list.assets[1].file_name(3), "002.jpg");
    assert_eq!(list.assets[2].source, "");
}

#[tokio::test]
async fn test_mediocretoons_without_work_id_is_rejected() {
    let adapter = MediocreToons::new();
    let mut session = common::http_session();

    let result = adapter.fetch_catalog("https://mediocretoons.com/explore", &mut session).await;

    assert!(matches!(result, Err(DownloadError::ParsingError(_))));
}
