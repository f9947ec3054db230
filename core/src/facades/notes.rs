use crate::client::ApiClient;
use crate::descriptor::RequestDescriptor;
use crate::error::ClientError;
use crate::query::QueryParams;
use crate::types::{CreateNote, Note, NoteQuery, Paginated, UpdateNote};

const NOTES: &str = "/api/v1/notes";

pub struct NotesApi<'a> {
    client: &'a ApiClient,
}

impl<'a> NotesApi<'a> {
    pub(crate) fn new(client: &'a ApiClient) -> Self {
        Self { client }
    }

    pub async fn list(&self, query: &NoteQuery) -> Result<Paginated<Note>, ClientError> {
        let params = QueryParams::from_serialize(query)?;
        self.client
            .request(RequestDescriptor::get(NOTES).query(params))
            .await
    }

    pub async fn get(&self, id: &str) -> Result<Note, ClientError> {
        self.client
            .request(RequestDescriptor::get(format!("{NOTES}/{id}")))
            .await
    }

    pub async fn create(&self, input: &CreateNote) -> Result<Note, ClientError> {
        self.client
            .request(RequestDescriptor::post(NOTES).json(input)?)
            .await
    }

    pub async fn update(&self, id: &str, input: &UpdateNote) -> Result<Note, ClientError> {
        self.client
            .request(RequestDescriptor::patch(format!("{NOTES}/{id}")).json(input)?)
            .await
    }

    pub async fn delete(&self, id: &str) -> Result<(), ClientError> {
        self.client
            .request_body(RequestDescriptor::delete(format!("{NOTES}/{id}")))
            .await
            .map(|_| ())
    }
}
