//! In-memory fakes of both services for reconciler and migrator tests.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::immich::{self, ApiResponse, AssetUpload, DestinationApi, DestinationError, UploadOutcome};
use crate::photoprism::{self, AssetPayload, Photo, SourceApi, SourceError};

pub(crate) fn photo(uid: &str) -> Photo {
    serde_json::from_value(serde_json::json!({
        "UID": uid,
        "FileName": format!("2021/{}.jpg", uid),
        "FileRoot": "/",
        "CreatedAt": "2021-07-14T09:12:00Z",
        "UpdatedAt": "2021-07-15T09:12:00Z",
    }))
    .unwrap()
}

pub(crate) fn located_photo(uid: &str, lat: f64, lng: f64) -> Photo {
    let mut photo = photo(uid);
    photo.lat = Some(lat);
    photo.lng = Some(lng);
    photo
}

#[derive(Default)]
pub(crate) struct FakeSource {
    albums: Vec<photoprism::Album>,
    photos: Vec<Photo>,
    memberships: HashMap<String, Vec<String>>,
    missing: HashSet<String>,
    detail_calls: Mutex<Vec<String>>,
}

impl FakeSource {
    pub fn with_albums(titles: &[&str]) -> Self {
        let albums = titles
            .iter()
            .enumerate()
            .map(|(i, title)| photoprism::Album {
                uid: format!("aq{}", i),
                title: title.to_string(),
            })
            .collect();
        Self {
            albums,
            ..Default::default()
        }
    }

    pub fn photo(mut self, photo: Photo, albums: &[&str]) -> Self {
        self.memberships.insert(
            photo.uid.clone(),
            albums.iter().map(|a| a.to_string()).collect(),
        );
        self.photos.push(photo);
        self
    }

    /// Make `stat_asset` fail for `uid` as if its original were gone.
    pub fn missing_original(mut self, uid: &str) -> Self {
        self.missing.insert(uid.to_string());
        self
    }

    pub fn photos(&self) -> Vec<Photo> {
        self.photos.clone()
    }

    pub fn detail_calls(&self) -> Vec<String> {
        self.detail_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SourceApi for FakeSource {
    async fn list_albums(&self) -> Result<Vec<photoprism::Album>, SourceError> {
        Ok(self.albums.clone())
    }

    async fn list_assets(&self) -> Result<Vec<Photo>, SourceError> {
        Ok(photoprism::primary_root_only(self.photos.clone()))
    }

    async fn asset_albums(&self, uid: &str) -> Result<Vec<String>, SourceError> {
        self.detail_calls.lock().unwrap().push(uid.to_string());
        Ok(self.memberships.get(uid).cloned().unwrap_or_default())
    }

    async fn stat_asset(&self, photo: &Photo) -> Result<AssetPayload, SourceError> {
        let path = PathBuf::from("/originals").join(&photo.file_name);
        if self.missing.contains(&photo.uid) {
            return Err(SourceError::Io {
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
                path,
            });
        }
        Ok(AssetPayload::new(path, 100 + photo.uid.len() as u64))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    CreateAlbum(String),
    Upload(String),
    Location { asset_id: String, latitude: f64, longitude: f64 },
    Link { album_id: String, asset_ids: Vec<String> },
}

#[derive(Default)]
struct DestinationState {
    albums: Vec<immich::Album>,
    next_album: usize,
    uploaded: HashSet<String>,
    rejected_albums: HashSet<String>,
    upload_failures: HashMap<String, u16>,
    location_failures: HashSet<String>,
    link_failures: HashSet<String>,
    calls: Vec<Call>,
    upload_requests: Vec<AssetUpload>,
}

#[derive(Default)]
pub(crate) struct FakeDestination {
    state: Mutex<DestinationState>,
}

impl FakeDestination {
    pub fn with_albums(names: &[&str]) -> Self {
        let fake = Self::default();
        {
            let mut state = fake.state.lock().unwrap();
            for name in names {
                let id = format!("existing-{}", name.to_lowercase());
                state.albums.push(immich::Album {
                    id,
                    album_name: name.to_string(),
                });
            }
        }
        fake
    }

    pub fn reject_album_creation(&self, name: &str) {
        self.state
            .lock()
            .unwrap()
            .rejected_albums
            .insert(name.to_string());
    }

    /// Reject the upload of the given device-asset id with `status`.
    pub fn reject_upload(&self, device_asset_id: &str, status: u16) {
        self.state
            .lock()
            .unwrap()
            .upload_failures
            .insert(device_asset_id.to_string(), status);
    }

    pub fn reject_location(&self, asset_id: &str) {
        self.state
            .lock()
            .unwrap()
            .location_failures
            .insert(asset_id.to_string());
    }

    pub fn reject_link(&self, album_id: &str) {
        self.state
            .lock()
            .unwrap()
            .link_failures
            .insert(album_id.to_string());
    }

    pub fn album_id(&self, name: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .albums
            .iter()
            .find(|a| a.album_name == name)
            .map(|a| a.id.clone())
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn created_albums(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::CreateAlbum(name) => Some(name),
                _ => None,
            })
            .collect()
    }

    pub fn uploads(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Upload(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    pub fn links(&self) -> Vec<(String, Vec<String>)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Link {
                    album_id,
                    asset_ids,
                } => Some((album_id, asset_ids)),
                _ => None,
            })
            .collect()
    }

    /// Every upload request as received, rejected ones included.
    pub fn upload_requests(&self) -> Vec<AssetUpload> {
        self.state.lock().unwrap().upload_requests.clone()
    }

    pub fn location_updates(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Location { .. }))
            .count()
    }
}

pub(crate) fn asset_id_for(device_asset_id: &str) -> String {
    format!("im-{}", device_asset_id)
}

#[async_trait]
impl DestinationApi for FakeDestination {
    async fn list_albums(&self) -> Result<Vec<immich::Album>, DestinationError> {
        Ok(self.state.lock().unwrap().albums.clone())
    }

    async fn create_album(&self, name: &str) -> Result<ApiResponse, DestinationError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::CreateAlbum(name.to_string()));
        if state.rejected_albums.contains(name) {
            return Ok(ApiResponse::new(400, r#"{"message": "rejected"}"#));
        }
        state.next_album += 1;
        let id = format!("created-{}", state.next_album);
        state.albums.push(immich::Album {
            id: id.clone(),
            album_name: name.to_string(),
        });
        Ok(ApiResponse::new(201, &format!(r#"{{"id": "{}"}}"#, id)))
    }

    async fn upload_asset(&self, upload: &AssetUpload) -> Result<UploadOutcome, DestinationError> {
        let mut state = self.state.lock().unwrap();
        let device_asset_id = upload.device_asset_id.clone();
        state.calls.push(Call::Upload(device_asset_id.clone()));
        state.upload_requests.push(upload.clone());
        if let Some(status) = state.upload_failures.get(&device_asset_id) {
            return Ok(UploadOutcome::Rejected(ApiResponse::new(
                *status,
                r#"{"message": "upload rejected"}"#,
            )));
        }
        let duplicate = !state.uploaded.insert(device_asset_id.clone());
        Ok(UploadOutcome::Created {
            id: asset_id_for(&device_asset_id),
            duplicate,
        })
    }

    async fn update_asset_location(
        &self,
        asset_id: &str,
        latitude: f64,
        longitude: f64,
    ) -> Result<ApiResponse, DestinationError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Location {
            asset_id: asset_id.to_string(),
            latitude,
            longitude,
        });
        if state.location_failures.contains(asset_id) {
            return Ok(ApiResponse::new(400, "invalid coordinates"));
        }
        Ok(ApiResponse::new(204, ""))
    }

    async fn add_assets_to_album(
        &self,
        album_id: &str,
        asset_ids: &[String],
    ) -> Result<ApiResponse, DestinationError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Link {
            album_id: album_id.to_string(),
            asset_ids: asset_ids.to_vec(),
        });
        if state.link_failures.contains(album_id) {
            return Ok(ApiResponse::new(500, r#"{"message": "link failed"}"#));
        }
        Ok(ApiResponse::new(
            200,
            &format!(r#"[{{"id": "{}", "success": true}}]"#, asset_ids.join(",")),
        ))
    }
}
