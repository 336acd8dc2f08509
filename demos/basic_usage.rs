//! Basic usage of diary-kit.
//!
//! Creates a couple of customers and tickets, moves tickets through the
//! workflow and prints the two list views.
//!
//! Run with: RUST_LOG=debug cargo run --example basic_usage

use diary_kit::attachment::PickedFile;
use diary_kit::location::{InMemoryLocationSearch, NamedPoint};
use diary_kit::{Coordinate, DiaryService, InMemoryStore, TicketStatus};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let store = InMemoryStore::new();
    let diary = DiaryService::new(store.clone());

    // Customer with a saved location found through the location search
    let gazetteer = InMemoryLocationSearch::new(vec![
        NamedPoint::new("Harbour Office", Coordinate::new(51.5072, -0.1276)),
        NamedPoint::new("Market Hall", Coordinate::new(51.5055, -0.0910)),
    ]);
    let search = diary.debounced_search(gazetteer);

    let mut form = diary.customer_form(None).await?;
    form.fields.name = "Maria Lopez".to_string();
    form.fields.phone = "555-0100".to_string();
    if let Some(hits) = search.search("market", None).await {
        for hit in hits {
            form.locations.add(&store, hit).await?;
        }
    }
    let maria = diary.submit_customer(form.submit()?).await?;

    let mut form = diary.customer_form(None).await?;
    form.fields.name = "bob".to_string();
    let bob = diary.submit_customer(form.submit()?).await?;

    // Tickets
    let mut form = diary.ticket_form(None, Some(maria)).await?;
    form.fields.service_name = "Marketing Visit".to_string();
    form.attachments
        .add(&store, PickedFile::photo("storefront.jpg", vec![0u8; 2048]))
        .await?;
    let visit = diary.submit_ticket(form.submit()?).await?;

    let mut form = diary.ticket_form(None, Some(bob)).await?;
    form.fields.service_name = "Boiler service".to_string();
    let boiler = diary.submit_ticket(form.submit()?).await?;

    diary.cycle_status(visit).await?;
    diary.set_status(boiler, TicketStatus::Done).await?;

    println!("Customers:");
    for section in diary.customer_sections("").await? {
        println!("  [{}]", section.key);
        for customer in &section.items {
            println!("    {}", diary.display_name(customer));
        }
    }

    println!("Tickets:");
    for section in diary.ticket_sections("").await? {
        println!("  {} ({})", section.title(), section.items.len());
        for row in &section.items {
            let location = if row.ticket.location_name.is_empty() {
                "-"
            } else {
                row.ticket.location_name.as_str()
            };
            println!(
                "    {} @ {} for {}",
                row.ticket.service_name,
                location,
                row.customer_label(&diary.config().unnamed_customer_label)
            );
        }
    }

    store.log_stats();
    Ok(())
}
