use anyhow::{Context, Result};
use serde_json::json;

use crate::api::ApplicationPageService;
use crate::model::{Application, EntityRef, Layout, NewApplication, NewPage, UserContext};
use crate::store::traits::Store;

const DEMO_APPLICATION_ID: &str = "demo_storefront";
const DEMO_ORG_ID: &str = "demo_org";

/// Helper to build a canvas layout with a single text widget
fn text_canvas(widget_name: &str, text: &str) -> Layout {
    json!({
        "type": "CANVAS",
        "children": [
            {
                "type": "TEXT_WIDGET",
                "widgetName": widget_name,
                "text": text,
            }
        ]
    })
}

/// Create a published demo application with three pages. Safe to run more
/// than once: the application and pages use fixed ids.
pub async fn load_seed_data<S: Store>(service: &ApplicationPageService<S>) -> Result<Application> {
    let application = service
        .create_application(
            NewApplication {
                id: Some(DEMO_APPLICATION_ID.to_string()),
                name: "Demo Storefront".to_string(),
            },
            DEMO_ORG_ID,
            &UserContext::system(),
        )
        .await
        .context("Failed to create demo application")?;

    let app_ref = EntityRef::from(application.id.clone());
    let pages = [
        ("demo_home", "Home", text_canvas("Welcome", "Welcome to the demo storefront")),
        ("demo_catalog", "Catalog", text_canvas("ProductList", "All products")),
        ("demo_checkout", "Checkout", text_canvas("CartSummary", "Your cart")),
    ];

    for (id, name, layout) in pages {
        service
            .create_page(
                &app_ref,
                NewPage {
                    id: Some(id.to_string()),
                    name: name.to_string(),
                    layout: Some(layout),
                },
            )
            .await
            .with_context(|| format!("Failed to create demo page '{}'", name))?;
    }

    let published = service
        .publish(&app_ref, false)
        .await
        .context("Failed to publish demo application")?;

    log::info!(
        "Seeded application {} with {} pages",
        published.id,
        published.published_pages.len()
    );
    Ok(published)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceSettings;
    use crate::store::MemoryStore;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_seed_is_repeatable() {
        let service = ApplicationPageService::new(Arc::new(MemoryStore::new()), ServiceSettings::default());

        let first = load_seed_data(&service).await.unwrap();
        assert_eq!(first.published_pages.len(), 3);
        assert_eq!(first.published_pages[0].id, "demo_home");
        assert!(first.published_pages[0].is_default);

        let second = load_seed_data(&service).await.unwrap();
        assert_eq!(second.published_pages, first.published_pages);
        assert_eq!(service.store().application_count(), 1);
        assert_eq!(service.store().page_count(), 3);

        let home = service
            .get_page_by_name("Demo Storefront", "Home", true)
            .await
            .unwrap();
        assert_eq!(home.id, "demo_home");
    }
}
