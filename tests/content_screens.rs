mod common;

use client_portal::content::{ContentScreen, Screen};
use client_portal::format::{format_optional_size, status_label};
use client_portal::models::{Certificate, Document, Video};
use client_portal::router::{Navigation, Route};
use client_portal::PortalError;
use common::*;
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn client_listing_only_requests_published_rows() {
    let server = MockServer::start().await;
    let portal = signed_in_portal(&server, CLIENT_ID, "client").await;
    let published = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/documents"))
        .and(query_param("is_published", "eq.true"))
        .and(query_param("order", "created_at.desc"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([document_body(published, "Guida AI 2026", true)])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let screen = portal.content().load::<Document>(Screen::Dashboard).await;
    assert_eq!(screen.items().len(), 1);
    assert!(screen.items().iter().all(|d| d.is_published));
}

#[tokio::test]
async fn admin_listing_is_unfiltered() {
    let server = MockServer::start().await;
    let portal = signed_in_portal(&server, ADMIN_ID, "admin").await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/documents"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            document_body(Uuid::new_v4(), "Pubblico", true),
            document_body(Uuid::new_v4(), "Bozza", false),
        ])))
        .mount(&server)
        .await;

    let documents = portal.content().list::<Document>(Screen::Admin).await;
    assert_eq!(documents.len(), 2);
    assert!(documents.iter().any(|d| !d.is_published));

    let requests = server.received_requests().await.unwrap();
    let listing = requests
        .iter()
        .find(|r| r.url.path() == "/rest/v1/documents")
        .unwrap();
    assert!(!listing.url.query_pairs().any(|(key, _)| key == "is_published"));
}

#[tokio::test]
async fn client_certificates_are_scoped_to_owner() {
    let server = MockServer::start().await;
    let portal = signed_in_portal(&server, CLIENT_ID, "client").await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/certificates"))
        .and(query_param("is_published", "eq.true"))
        .and(query_param("client_id", format!("eq.{}", CLIENT_ID)))
        .and(query_param("select", "*,client:profiles(full_name,company_name,email)"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "id": Uuid::new_v4(),
            "client_id": CLIENT_ID,
            "title": "ISO 9001",
            "file_name": "iso.pdf",
            "file_url": "https://cdn.example.com/iso.pdf",
            "file_size": 1024,
            "file_type": "pdf",
            "category": null,
            "is_published": true,
            "created_at": "2026-02-01T10:00:00+00:00",
            "client": { "full_name": "Maria Rossi", "company_name": "Rossi Srl", "email": null }
        }])))
        .expect(1)
        .mount(&server)
        .await;

    let mut screen = portal.content().load::<Certificate>(Screen::Dashboard).await;
    screen.set_query("rossi");
    assert_eq!(screen.visible().len(), 1);
    screen.set_query("bianchi");
    assert!(screen.visible().is_empty());
}

#[tokio::test]
async fn admin_on_a_dashboard_screen_sees_only_published_rows() {
    let server = MockServer::start().await;
    let portal = signed_in_portal(&server, ADMIN_ID, "admin").await;

    let route = match portal.navigate("/dashboard/videos") {
        Navigation::Render(route) => route,
        other => panic!("unexpected navigation {:?}", other),
    };
    assert_eq!(route, Route::DashboardVideos);
    assert_eq!(Screen::for_route(&route), Some(Screen::Dashboard));

    Mock::given(method("GET"))
        .and(path("/rest/v1/videos"))
        .and(query_param("is_published", "eq.true"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([video_body(Uuid::new_v4(), "Intro", 300, true)])),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/certificates"))
        .and(query_param("is_published", "eq.true"))
        .and(query_param("client_id", format!("eq.{}", ADMIN_ID)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let videos = portal.content().load::<Video>(Screen::Dashboard).await;
    assert_eq!(videos.items().len(), 1);

    let certificates = portal.content().load::<Certificate>(Screen::Dashboard).await;
    assert!(certificates.items().is_empty());
}

#[tokio::test]
async fn clients_are_refused_admin_screens() {
    let server = MockServer::start().await;
    let portal = signed_in_portal(&server, CLIENT_ID, "client").await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/documents"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;

    assert!(matches!(
        portal.content().try_list::<Document>(Screen::Admin).await,
        Err(PortalError::Forbidden(_))
    ));
    assert!(portal.content().list::<Document>(Screen::Admin).await.is_empty());
    assert_eq!(Screen::for_route(&Route::AdminDocuments), Some(Screen::Admin));
    assert_eq!(Screen::for_route(&Route::Login), None);
}

#[tokio::test]
async fn video_detail_only_returns_published_videos() {
    let server = MockServer::start().await;
    let portal = signed_in_portal(&server, CLIENT_ID, "client").await;
    let published = Uuid::new_v4();
    let hidden = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/videos"))
        .and(query_param("id", format!("eq.{}", published)))
        .and(query_param("is_published", "eq.true"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([video_body(published, "Intro", 300, true)])),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/videos"))
        .and(query_param("id", format!("eq.{}", hidden)))
        .and(query_param("is_published", "eq.true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let video = portal
        .content()
        .get_video(Screen::Dashboard, published)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(video.title, "Intro");

    assert!(portal
        .content()
        .get_video(Screen::Dashboard, hidden)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn watch_progress_is_read_for_the_signed_in_user() {
    let server = MockServer::start().await;
    let portal = signed_in_portal(&server, CLIENT_ID, "client").await;
    let video_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/video_views"))
        .and(query_param("user_id", format!("eq.{}", CLIENT_ID)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "video_id": video_id,
            "user_id": CLIENT_ID,
            "progress_seconds": 120,
            "completed": false,
            "updated_at": "2026-02-03T18:30:00+00:00"
        }])))
        .expect(1)
        .mount(&server)
        .await;

    let views = portal.content().list_video_progress().await;
    assert_eq!(views.len(), 1);
    assert_eq!(views[0].video_id, video_id);
    assert_eq!(views[0].progress_seconds, 120);
}

#[tokio::test]
async fn dashboard_overview_counts_only_visible_rows() {
    let server = MockServer::start().await;
    let portal = signed_in_portal(&server, CLIENT_ID, "client").await;

    for table in ["videos", "documents"] {
        Mock::given(method("HEAD"))
            .and(path(format!("/rest/v1/{}", table)))
            .and(query_param("is_published", "eq.true"))
            .respond_with(ResponseTemplate::new(200).insert_header("content-range", "*/4"))
            .expect(1)
            .mount(&server)
            .await;
    }
    Mock::given(method("HEAD"))
        .and(path("/rest/v1/certificates"))
        .and(query_param("is_published", "eq.true"))
        .and(query_param("client_id", format!("eq.{}", CLIENT_ID)))
        .respond_with(ResponseTemplate::new(200).insert_header("content-range", "*/1"))
        .expect(1)
        .mount(&server)
        .await;

    let overview = portal.content().overview(Screen::Dashboard).await.unwrap();
    assert_eq!(overview.videos, 4);
    assert_eq!(overview.documents, 4);
    assert_eq!(overview.certificates, 1);
    assert_eq!(overview.clients, None);
}

#[tokio::test]
async fn failed_listing_yields_empty_screen() {
    let server = MockServer::start().await;
    let portal = signed_in_portal(&server, CLIENT_ID, "client").await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/videos"))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream unavailable"))
        .mount(&server)
        .await;

    let screen: ContentScreen<Video> = portal.content().load(Screen::Dashboard).await;
    assert!(screen.items().is_empty());
    assert!(portal.content().try_list::<Video>(Screen::Dashboard).await.is_err());
}

#[tokio::test]
async fn hidden_document_becomes_visible_after_publish() {
    let server = MockServer::start().await;
    let portal = signed_in_portal(&server, ADMIN_ID, "admin").await;
    let id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/documents"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([document_body(id, "Guida AI 2026", false)])),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;

    let before = portal.content().list::<Document>(Screen::Admin).await;
    assert_eq!(before[0].title, "Guida AI 2026");
    assert_eq!(before[0].category.as_deref(), Some("AI Strategy"));
    assert_eq!(before[0].file_type.as_deref(), Some("pdf"));
    assert_eq!(format_optional_size(before[0].file_size), "2.40 MB");
    assert_eq!(status_label(before[0].is_published), "Nascosto");

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/documents"))
        .and(query_param("id", format!("eq.{}", id)))
        .and(body_partial_json(json!({ "is_published": true })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([document_body(id, "Guida AI 2026", true)])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/documents"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([document_body(id, "Guida AI 2026", true)])),
        )
        .mount(&server)
        .await;

    let after = portal
        .content()
        .set_published::<Document>(id, true)
        .await
        .unwrap();
    assert_eq!(status_label(after[0].is_published), "Pubblicato");
}

#[tokio::test]
async fn clients_cannot_publish_or_delete() {
    let server = MockServer::start().await;
    let portal = signed_in_portal(&server, CLIENT_ID, "client").await;

    Mock::given(method("PATCH"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&server)
        .await;

    let err = portal
        .content()
        .set_published::<Video>(Uuid::new_v4(), true)
        .await
        .unwrap_err();
    assert!(matches!(err, PortalError::Forbidden(_)));

    let video: Video =
        serde_json::from_value(video_body(Uuid::new_v4(), "Intro", 300, true)).unwrap();
    let pending = portal.content().request_delete(&video);
    assert!(matches!(
        portal.content().confirm_delete(pending).await,
        Err(PortalError::Forbidden(_))
    ));
}

#[tokio::test]
async fn delete_runs_only_after_confirmation() {
    let server = MockServer::start().await;
    let portal = signed_in_portal(&server, ADMIN_ID, "admin").await;
    let id = Uuid::new_v4();

    Mock::given(method("DELETE"))
        .and(path("/rest/v1/videos"))
        .and(query_param("id", format!("eq.{}", id)))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/videos"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let video: Video = serde_json::from_value(video_body(id, "Intro", 300, true)).unwrap();
    let pending = portal.content().request_delete(&video);
    assert_eq!(pending.title, "Intro");

    let remaining = portal.content().confirm_delete(pending).await.unwrap();
    assert!(remaining.is_empty());
}

#[tokio::test]
async fn overview_counts_default_to_zero_on_failure() {
    let server = MockServer::start().await;
    let portal = signed_in_portal(&server, ADMIN_ID, "admin").await;

    for (table, total) in [("videos", "0-0/12"), ("certificates", "*/3")] {
        Mock::given(method("HEAD"))
            .and(path(format!("/rest/v1/{}", table)))
            .respond_with(ResponseTemplate::new(200).insert_header("content-range", total))
            .mount(&server)
            .await;
    }
    Mock::given(method("HEAD"))
        .and(path("/rest/v1/documents"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/rest/v1/profiles"))
        .and(query_param("role", "eq.client"))
        .respond_with(ResponseTemplate::new(200).insert_header("content-range", "0-4/5"))
        .mount(&server)
        .await;

    let overview = portal.content().overview(Screen::Admin).await.unwrap();
    assert_eq!(overview.videos, 12);
    assert_eq!(overview.documents, 0);
    assert_eq!(overview.certificates, 3);
    assert_eq!(overview.clients, Some(5));
}

#[tokio::test]
async fn download_is_recorded_for_the_signed_in_client() {
    let server = MockServer::start().await;
    let portal = signed_in_portal(&server, CLIENT_ID, "client").await;
    let id = Uuid::new_v4();
    let document: Document =
        serde_json::from_value(document_body(id, "Guida AI 2026", true)).unwrap();

    Mock::given(method("POST"))
        .and(path("/rest/v1/document_downloads"))
        .and(body_partial_json(json!({
            "document_id": id,
            "user_id": CLIENT_ID
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let url = portal.content().record_download(&document).await.unwrap();
    assert_eq!(url, document.file_url);
}

#[tokio::test]
async fn admin_edits_client_then_list_is_refetched() {
    let server = MockServer::start().await;
    let portal = signed_in_portal(&server, ADMIN_ID, "admin").await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/profiles"))
        .and(query_param("id", format!("eq.{}", CLIENT_ID)))
        .and(body_partial_json(json!({ "company_name": "Rossi S.p.A." })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/profiles"))
        .and(query_param("role", "eq.client"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([profile_body(CLIENT_ID, "client")])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let update = client_portal::models::ProfileUpdate {
        company_name: Some("Rossi S.p.A.".to_string()),
        ..Default::default()
    };
    let clients = portal
        .content()
        .update_client(Uuid::parse_str(CLIENT_ID).unwrap(), update)
        .await
        .unwrap();
    assert_eq!(clients.len(), 1);
}
