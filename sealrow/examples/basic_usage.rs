//! Basic usage example for `SealRow`.

use sealrow::prelude::*;
use sealrow_key_file::FileKeySource;
use std::path::PathBuf;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("SealRow Basic Usage Example");
    println!("===========================\n");

    let key_dir = PathBuf::from("./example_keys");
    if !key_dir.exists() {
        println!("Initializing key directory at {}...", key_dir.display());
        FileKeySource::init(&key_dir, 2048)?;
    }
    let source = FileKeySource::new(&key_dir)?;

    let service = RecordService::from_key_source(MemoryStore::new(), &source)?;
    println!("Service ready (max field size: {} bytes)\n", service_limit(&source)?);

    let ann = service.add_user(&NewUser::new("Ann", "ann@example.com", "Editor"))?;
    service.add_user(&NewUser::new("Bob", "bob@example.com", "Admin"))?;
    println!("Added user {} ({})", ann.id, ann.email);

    // Rows hold only ciphertext and a digest.
    let row = &service.store().select_all(None)?[0];
    println!("Stored name:  {}...", &row.name.as_str()[..24]);
    println!("Stored hash:  {}\n", row.email_hash);

    match service.add_user(&NewUser::new("Ann Again", "ann@example.com", "Viewer")) {
        Err(Error::Conflict) => println!("Duplicate email rejected\n"),
        other => println!("Unexpected result: {other:?}\n"),
    }

    for user in service.list_users()? {
        println!("{:>3}  {:<6} {:<18} {}", user.id, user.role, user.email, user.name);
    }

    // Seal the listing for a client that holds its own keypair.
    let client = StorageKeys::generate(2048)?;
    let recipient = RecipientKey::from_pem(&client.public_key_pem()?)?;
    let sealed = service.list_users_sealed(&recipient, Some(Role::Admin))?;
    println!("\nSealed for recipient:\n{}", serde_json::to_string_pretty(&sealed)?);

    service.delete_user(ann.id)?;
    println!("\nDeleted user {}", ann.id);
    println!("Key directory at {} can be deleted manually", key_dir.display());

    Ok(())
}

fn service_limit(source: &FileKeySource) -> Result<usize, KeySourceError> {
    Ok(source.storage_keys()?.max_plaintext_len())
}
