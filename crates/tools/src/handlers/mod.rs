//! One handler per catalog entry.

mod contacts;
mod deals;
mod drafts;
mod file;
mod property;
mod todos;

pub use contacts::{AddContact, SearchContacts, UpdateContact};
pub use deals::{
    upcoming_deadlines, CheckUpcomingDeadlines, CreateDeal, GetActiveDeals, GetDealDetails,
    UpdateDeal,
};
pub use drafts::Draft;
pub use file::CreateFile;
pub use property::EnrichProperty;
pub use todos::{CreateTodos, UpdateTodo};

use hb_domain::crm::{Contact, Deal};
use hb_store::CrmStore;
use serde_json::Value;

use crate::input::DealLookup;

/// A row as shown to the model: no owner id, no empty fields.
pub(crate) fn compact<T: serde::Serialize>(row: &T) -> Value {
    let mut v = serde_json::to_value(row).unwrap_or(Value::Null);
    if let Value::Object(map) = &mut v {
        map.remove("owner_id");
        map.retain(|_, v| !v.is_null());
    }
    v
}

pub(crate) fn deal_view(deal: &Deal) -> Value {
    compact(deal)
}

pub(crate) fn contact_view(contact: &Contact) -> Value {
    compact(contact)
}

/// Resolve a deal by id first, then by address fragment.
pub(crate) async fn resolve_deal(
    store: &dyn CrmStore,
    owner: &str,
    lookup: &DealLookup,
) -> hb_domain::error::Result<Option<Deal>> {
    if let Some(id) = &lookup.deal_id {
        if let Some(deal) = store.get_deal(owner, id).await? {
            return Ok(Some(deal));
        }
    }
    match &lookup.address {
        Some(address) => store.find_deal_by_address(owner, address).await,
        None => Ok(None),
    }
}
