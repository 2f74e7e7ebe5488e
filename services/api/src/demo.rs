use crate::infra::Adapters;
use buildiq::auth::Role;
use buildiq::config::AppConfig;
use buildiq::error::AppError;
use buildiq::rental::{
    ApartmentId, ApartmentRepository, PaymentSubmission, QuoteRequest, RequestStatus, RoleUpdate,
    SubmitRequest,
};
use clap::Args;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Resident account used for the walkthrough
    #[arg(long, default_value = "resident@buildiq.example")]
    pub(crate) email: String,
    /// Apartment the resident requests
    #[arg(long, default_value = "apt-201")]
    pub(crate) apartment: String,
}

/// Walk the whole lifecycle against seeded stores, printing each outcome.
pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let adapters = Adapters::new(&config.auth);
    adapters.seed();
    let context = adapters.context();
    let apartment_id = ApartmentId(args.apartment.clone());

    println!("== BuildIQ lifecycle demo ==");

    let resident = context.directory.register(&args.email)?;
    println!("registered {} with role {}", resident.email, resident.role.label());

    let request = match context.requests.submit(
        &args.email,
        SubmitRequest {
            email: args.email.clone(),
            apartment_id: apartment_id.clone(),
        },
    ) {
        Ok(request) => request,
        Err(err) => {
            println!("request rejected: {err}");
            return Ok(());
        }
    };
    println!("request {} submitted ({})", request.id.0, request.status.label());

    match context.requests.decide(&request.id, RequestStatus::Accepted) {
        Ok(decided) => println!("request {} now {}", decided.id.0, decided.status.label()),
        Err(err) => println!("decision failed: {err}"),
    }

    match context.membership.allocate(&args.email, &apartment_id) {
        Ok(record) => println!(
            "allocated {} to {}",
            record.apartment_id.0, record.email
        ),
        Err(err) => println!("allocation failed: {err}"),
    }

    match context.membership.update_role(RoleUpdate {
        email: args.email.clone(),
        role: Role::Member,
        apartment_id: Some(apartment_id.clone()),
        delete_apartment: false,
    }) {
        Ok(view) => println!("{} promoted to {}", view.email, view.role.label()),
        Err(err) => println!("role update failed: {err}"),
    }

    let rent = adapters
        .apartments
        .fetch(&apartment_id)?
        .map(|apartment| apartment.rent)
        .unwrap_or(1200);
    match context.billing.quote(&QuoteRequest {
        rent,
        coupon: Some("SAVE10".to_string()),
        discount: 10,
    }) {
        Ok(authorization) => println!(
            "charge authorized: {} minor units ({})",
            authorization.amount_minor, authorization.client_secret
        ),
        Err(err) => println!("quote failed: {err}"),
    }

    let payment = context.billing.record(PaymentSubmission {
        email: args.email.clone(),
        rent,
        discount: rent / 10,
        coupon: Some("SAVE10".to_string()),
    })?;
    println!(
        "payment recorded: rent {} discount {} amount {}",
        payment.rent, payment.discount, payment.amount
    );

    let stats = context.inventory.statistics()?;
    println!(
        "inventory: {} apartments, {:.1}% available, {:.1}% unavailable",
        stats.total_apartments, stats.available_percent, stats.unavailable_percent
    );

    for event in adapters.audit.events() {
        println!(
            "audit: {} {} -> {}",
            event.email,
            event.previous.label(),
            event.new.label()
        );
    }

    Ok(())
}
