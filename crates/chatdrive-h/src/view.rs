use crate::cdp::{CdpClient, ConnectMode};
use crate::inject::{node_object_id, run_probe};
use async_trait::async_trait;
use chatdrive_engine::protocol::{Descriptor, Element, PageState, ProbeAction};
use chatdrive_engine::view::{DocumentView, NavigationResult, ViewError};
use chromiumoxide::Page;
use chromiumoxide::cdp::browser_protocol::dom::SetFileInputFilesParams;
use chromiumoxide::cdp::browser_protocol::input::{DispatchKeyEventParams, DispatchKeyEventType};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

const REACHABILITY_TIMEOUT: Duration = Duration::from_secs(2);

/// `DocumentView` over one Chromium tab.
pub struct CdpView {
    client: Option<CdpClient>,
    mode: ConnectMode,
    home_url: String,
}

impl CdpView {
    pub async fn open(mode: ConnectMode, home_url: &str) -> Result<Self, ViewError> {
        let client = CdpClient::open(&mode, home_url)
            .await
            .map_err(|e| ViewError::Other(e.to_string()))?;
        Ok(Self {
            client: Some(client),
            mode,
            home_url: home_url.to_string(),
        })
    }

    pub fn client(&self) -> Option<&CdpClient> {
        self.client.as_ref()
    }

    fn page(&self) -> Result<&Page, ViewError> {
        self.client
            .as_ref()
            .map(|c| &c.page)
            .ok_or(ViewError::ConnectionLost)
    }

    async fn probe(&self, action: ProbeAction) -> Result<serde_json::Value, ViewError> {
        run_probe(self.page()?, &action).await
    }

    async fn navigation_result(page: &Page) -> Result<NavigationResult, ViewError> {
        let title = page
            .get_title()
            .await
            .unwrap_or_default()
            .unwrap_or_default();
        let url = page
            .url()
            .await
            .map_err(|e| ViewError::Navigation(e.to_string()))?
            .unwrap_or_default();
        Ok(NavigationResult { url, title })
    }

    async fn dispatch_key(
        page: &Page,
        kind: DispatchKeyEventType,
        key: &str,
    ) -> Result<(), ViewError> {
        let mut builder = DispatchKeyEventParams::builder().r#type(kind.clone()).key(key);
        if key == "Enter" {
            builder = builder.code("Enter").windows_virtual_key_code(13);
            if kind == DispatchKeyEventType::KeyDown {
                builder = builder.text("\r");
            }
        }
        let event = builder
            .build()
            .map_err(|e| ViewError::Other(format!("Failed to build key event: {:?}", e)))?;
        page.execute(event)
            .await
            .map_err(|e| ViewError::Other(format!("press_key {:?} failed: {}", kind, e)))?;
        Ok(())
    }
}

#[async_trait]
impl DocumentView for CdpView {
    async fn query(&mut self, descriptor: &Descriptor) -> Result<Vec<Element>, ViewError> {
        let data = self
            .probe(ProbeAction::Query {
                descriptor: descriptor.clone(),
            })
            .await?;
        Ok(serde_json::from_value(data)?)
    }

    async fn inspect(&mut self, id: u32) -> Result<Option<Element>, ViewError> {
        let data = self.probe(ProbeAction::Inspect { id }).await?;
        Ok(serde_json::from_value(data)?)
    }

    async fn click(&mut self, id: u32) -> Result<(), ViewError> {
        self.probe(ProbeAction::Click { id }).await?;
        Ok(())
    }

    async fn set_text(&mut self, id: u32, text: &str) -> Result<(), ViewError> {
        self.probe(ProbeAction::SetText {
            id,
            text: text.to_string(),
        })
        .await?;
        Ok(())
    }

    async fn upload(&mut self, id: u32, path: &Path) -> Result<(), ViewError> {
        let page = self.page()?;
        let object_id = node_object_id(page, id).await?;
        let file = path
            .canonicalize()
            .map_err(ViewError::from)?
            .to_string_lossy()
            .into_owned();
        let params = SetFileInputFilesParams::builder()
            .files(vec![file])
            .object_id(object_id)
            .build()
            .map_err(ViewError::InvalidRequest)?;
        page.execute(params)
            .await
            .map_err(|e| ViewError::Other(format!("Failed to set input files: {}", e)))?;
        info!(id, path = %path.display(), "Attached file");
        Ok(())
    }

    async fn press_key(&mut self, id: u32, key: &str) -> Result<(), ViewError> {
        self.probe(ProbeAction::Focus { id }).await?;
        let page = self.page()?;
        Self::dispatch_key(page, DispatchKeyEventType::KeyDown, key).await?;
        Self::dispatch_key(page, DispatchKeyEventType::KeyUp, key).await
    }

    async fn is_loading(&mut self) -> Result<bool, ViewError> {
        let data = self.probe(ProbeAction::State).await?;
        let state: PageState = serde_json::from_value(data)?;
        Ok(state.is_loading())
    }

    async fn is_reachable(&mut self) -> bool {
        let Ok(page) = self.page() else {
            return false;
        };
        matches!(
            tokio::time::timeout(REACHABILITY_TIMEOUT, page.evaluate("1")).await,
            Ok(Ok(_))
        )
    }

    async fn navigate(&mut self, url: &str) -> Result<NavigationResult, ViewError> {
        let page = self.page()?;
        info!("Navigating to: {}", url);
        page.goto(url)
            .await
            .map_err(|e| ViewError::Navigation(e.to_string()))?;
        Self::navigation_result(page).await
    }

    async fn reload(&mut self) -> Result<(), ViewError> {
        let page = self.page()?;
        page.reload()
            .await
            .map_err(|e| ViewError::Navigation(format!("reload failed: {}", e)))?;
        Ok(())
    }

    /// Attached browsers are re-attached; a launched browser died with its
    /// process and cannot be brought back here.
    async fn reconnect(&mut self) -> Result<(), ViewError> {
        let ConnectMode::Connect { .. } = &self.mode else {
            return Err(ViewError::NotSupported(
                "reconnect of a launched browser".into(),
            ));
        };
        if let Some(old) = self.client.take()
            && let Err(e) = old.close().await
        {
            debug!("Dropping old connection: {}", e);
        }
        match CdpClient::open(&self.mode, &self.home_url).await {
            Ok(client) => {
                info!("Reconnected to browser");
                self.client = Some(client);
                Ok(())
            }
            Err(e) => {
                warn!("Reconnect failed: {}", e);
                Err(ViewError::ConnectionLost)
            }
        }
    }

    async fn close(&mut self) -> Result<(), ViewError> {
        if let Some(client) = self.client.take() {
            client
                .close()
                .await
                .map_err(|e| ViewError::Other(e.to_string()))?;
        }
        Ok(())
    }
}
