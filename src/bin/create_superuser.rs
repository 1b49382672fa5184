use std::env;

use anyhow::{bail, Context, Result};
use diesel::prelude::*;

use hr_backend::{
    auth::password,
    config::AppConfig,
    db,
    models::{Account, NewAccount},
    policy::Role,
    schema::accounts,
};

const USAGE: &str = "Usage: create_superuser <username> <password> [email]";

fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let mut args = env::args().skip(1);
    let (Some(username), Some(raw_password)) = (args.next(), args.next()) else {
        eprintln!("{USAGE}");
        std::process::exit(1);
    };
    let email = args.next().unwrap_or_default();

    let username = username.trim().to_string();
    if username.is_empty() || raw_password.is_empty() {
        bail!("username and password must not be empty");
    }

    let config = AppConfig::from_env()?;
    let pool = db::init_pool_with_size(&config.database_url, 1)?;
    db::run_migrations(&pool)?;
    let mut conn = pool.get().context("failed to get database connection")?;

    let taken: bool = diesel::select(diesel::dsl::exists(
        accounts::table.filter(accounts::username.eq(&username)),
    ))
    .get_result(&mut conn)
    .context("failed to check existing accounts")?;
    if taken {
        bail!("an account named {username} already exists");
    }

    let account: Account = diesel::insert_into(accounts::table)
        .values(&NewAccount {
            username,
            first_name: String::new(),
            last_name: String::new(),
            email,
            password_hash: password::hash_password(&raw_password)?,
            phone: None,
            address: None,
            date_of_birth: None,
            position: None,
            role: Role::Superuser.as_str().to_string(),
            department_id: None,
            is_active: true,
        })
        .get_result(&mut conn)
        .context("failed to insert superuser")?;

    println!("Created superuser {} (id {}).", account.username, account.id);
    Ok(())
}
